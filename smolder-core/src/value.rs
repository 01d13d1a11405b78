use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A dynamically-typed value produced by a generator.
///
/// Carries enough structure for all three downstream renderings: JSON body
/// serialization, URL path/query rendering, and failure-report display.
#[derive(Debug, Clone, PartialEq)]
pub enum GenValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Seq(Vec<GenValue>),
    Map(Vec<(GenValue, GenValue)>),
    Record(Vec<(String, GenValue)>),
}

impl GenValue {
    /// Canonical textual rendering used for path segments, query values and
    /// header values.
    ///
    /// Integers render as decimal, UUIDs as lowercase 8-4-4-4-12, booleans
    /// as `true`/`false`, datetimes as RFC 3339, bytes as standard base64.
    /// Composite values have no scalar rendering and return `None`.
    pub fn render_scalar(&self) -> Option<String> {
        match self {
            GenValue::Null => None,
            GenValue::Bool(b) => Some(if *b { "true".into() } else { "false".into() }),
            GenValue::Int(i) => Some(i.to_string()),
            GenValue::Float(x) => Some(x.to_string()),
            GenValue::Str(s) => Some(s.clone()),
            GenValue::Bytes(b) => Some(base64::engine::general_purpose::STANDARD.encode(b)),
            GenValue::Uuid(u) => Some(u.as_hyphenated().to_string()),
            GenValue::DateTime(dt) => Some(dt.to_rfc3339()),
            GenValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            GenValue::Seq(_) | GenValue::Map(_) | GenValue::Record(_) => None,
        }
    }

    /// Convert to a `serde_json::Value` for body serialization and reports.
    pub fn to_json(&self) -> Value {
        match self {
            GenValue::Null => Value::Null,
            GenValue::Bool(b) => Value::Bool(*b),
            GenValue::Int(i) => Value::from(*i),
            GenValue::Float(x) => {
                // Generators only emit finite floats; fall back to null if a
                // non-finite value sneaks in through a user generator.
                serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number)
            }
            GenValue::Str(s) => Value::String(s.clone()),
            GenValue::Bytes(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            GenValue::Uuid(u) => Value::String(u.as_hyphenated().to_string()),
            GenValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            GenValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            GenValue::Seq(items) => Value::Array(items.iter().map(GenValue::to_json).collect()),
            GenValue::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    let key = k.render_scalar().unwrap_or_default();
                    map.insert(key, v.to_json());
                }
                Value::Object(map)
            }
            GenValue::Record(fields) => {
                let mut map = serde_json::Map::new();
                for (name, v) in fields {
                    map.insert(name.clone(), v.to_json());
                }
                Value::Object(map)
            }
        }
    }

    /// True for the absent value produced by `Optional` generators.
    pub fn is_null(&self) -> bool {
        matches!(self, GenValue::Null)
    }

    /// Lift a JSON document into a `GenValue`, e.g. a field extracted from
    /// a response that feeds a later request's parameter.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => GenValue::Null,
            Value::Bool(b) => GenValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => GenValue::Int(i),
                None => GenValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => GenValue::Str(s.clone()),
            Value::Array(items) => GenValue::Seq(items.iter().map(GenValue::from_json).collect()),
            Value::Object(map) => GenValue::Record(
                map.iter().map(|(k, v)| (k.clone(), GenValue::from_json(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_renderings_are_canonical() {
        assert_eq!(GenValue::Int(-42).render_scalar().unwrap(), "-42");
        assert_eq!(GenValue::Bool(true).render_scalar().unwrap(), "true");
        let u = Uuid::nil();
        assert_eq!(
            GenValue::Uuid(u).render_scalar().unwrap(),
            "00000000-0000-0000-0000-000000000000"
        );
        assert!(GenValue::Seq(vec![]).render_scalar().is_none());
    }

    #[test]
    fn record_converts_to_json_object() {
        let v = GenValue::Record(vec![
            ("id".into(), GenValue::Int(7)),
            ("name".into(), GenValue::Str("x".into())),
        ]);
        assert_eq!(v.to_json(), serde_json::json!({"id": 7, "name": "x"}));
    }
}
