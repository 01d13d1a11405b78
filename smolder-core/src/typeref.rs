//! The schema AST shared by parameters, bodies and response contracts.
//!
//! `TypeRef` replaces run-time type introspection: extractors lower whatever
//! schema language they speak (OpenAPI components, framework converters)
//! into this tagged variant once, and everything downstream - generation,
//! validation, reporting - is keyed off it.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::CoreError;

/// Primitive scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Uuid,
    DateTime,
    Date,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Str => "str",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Bool => "bool",
            Primitive::Bytes => "bytes",
            Primitive::Uuid => "uuid",
            Primitive::DateTime => "datetime",
            Primitive::Date => "date",
        }
    }
}

/// A named record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty, required: true }
    }

    pub fn optional(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty, required: false }
    }
}

/// The schema node for one domain type.
///
/// `Ref` names an entry in a [`SchemaTable`] carried alongside, which is how
/// self- and mutually-recursive schemas are expressed without cyclic
/// ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(Primitive),
    Optional(Box<TypeRef>),
    Seq { item: Box<TypeRef>, min: usize, max: usize },
    Map { key: Box<TypeRef>, value: Box<TypeRef>, min: usize, max: usize },
    Enum(Vec<String>),
    Record { fields: Vec<Field> },
    OneOf(Vec<TypeRef>),
    Ref(String),
}

impl TypeRef {
    pub const STR: TypeRef = TypeRef::Primitive(Primitive::Str);
    pub const INT: TypeRef = TypeRef::Primitive(Primitive::Int);
    pub const FLOAT: TypeRef = TypeRef::Primitive(Primitive::Float);
    pub const BOOL: TypeRef = TypeRef::Primitive(Primitive::Bool);
    pub const BYTES: TypeRef = TypeRef::Primitive(Primitive::Bytes);
    pub const UUID: TypeRef = TypeRef::Primitive(Primitive::Uuid);
    pub const DATETIME: TypeRef = TypeRef::Primitive(Primitive::DateTime);
    pub const DATE: TypeRef = TypeRef::Primitive(Primitive::Date);

    pub fn optional(inner: TypeRef) -> TypeRef {
        TypeRef::Optional(Box::new(inner))
    }

    pub fn seq(item: TypeRef, min: usize, max: usize) -> TypeRef {
        TypeRef::Seq { item: Box::new(item), min, max }
    }

    pub fn map(key: TypeRef, value: TypeRef, min: usize, max: usize) -> TypeRef {
        TypeRef::Map { key: Box::new(key), value: Box::new(value), min, max }
    }

    pub fn record(fields: Vec<Field>) -> TypeRef {
        TypeRef::Record { fields }
    }

    pub fn reference(name: impl Into<String>) -> TypeRef {
        TypeRef::Ref(name.into())
    }

    /// The path-converter tag form used in route patterns (`{id:int}`).
    pub fn from_tag(tag: &str) -> Option<TypeRef> {
        let prim = match tag {
            "str" | "string" => Primitive::Str,
            "int" | "integer" => Primitive::Int,
            "float" | "number" => Primitive::Float,
            "bool" | "boolean" => Primitive::Bool,
            "uuid" => Primitive::Uuid,
            "datetime" => Primitive::DateTime,
            "date" => Primitive::Date,
            _ => return None,
        };
        Some(TypeRef::Primitive(prim))
    }

    /// Check a decoded JSON document against this schema.
    ///
    /// Returns the first mismatch as a human-readable path + reason. Used by
    /// the response-schema validator; request generation never needs it.
    pub fn matches_json(&self, value: &Value, table: &SchemaTable) -> Result<(), String> {
        self.matches_at(value, table, "$", 0)
    }

    fn matches_at(
        &self,
        value: &Value,
        table: &SchemaTable,
        path: &str,
        depth: usize,
    ) -> Result<(), String> {
        // Conformance checking only ever follows refs as deep as the
        // document itself, so a generous fixed bound is safe.
        if depth > 64 {
            return Err(format!("{path}: schema recursion exceeded"));
        }
        match self {
            TypeRef::Primitive(p) => match (p, value) {
                (Primitive::Str, Value::String(_)) => Ok(()),
                (Primitive::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
                (Primitive::Float, Value::Number(_)) => Ok(()),
                (Primitive::Bool, Value::Bool(_)) => Ok(()),
                (Primitive::Bytes, Value::String(_)) => Ok(()),
                (Primitive::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s)
                    .map(|_| ())
                    .map_err(|_| format!("{path}: `{s}` is not a UUID")),
                (Primitive::DateTime, Value::String(s)) => {
                    chrono::DateTime::parse_from_rfc3339(s)
                        .map(|_| ())
                        .map_err(|_| format!("{path}: `{s}` is not an RFC 3339 datetime"))
                }
                (Primitive::Date, Value::String(s)) => {
                    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .map(|_| ())
                        .map_err(|_| format!("{path}: `{s}` is not a date"))
                }
                _ => Err(format!("{path}: expected {}, got {}", p.name(), kind_of(value))),
            },
            TypeRef::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.matches_at(value, table, path, depth + 1)
                }
            }
            TypeRef::Seq { item, .. } => match value {
                Value::Array(items) => {
                    for (i, v) in items.iter().enumerate() {
                        item.matches_at(v, table, &format!("{path}[{i}]"), depth + 1)?;
                    }
                    Ok(())
                }
                other => Err(format!("{path}: expected array, got {}", kind_of(other))),
            },
            TypeRef::Map { value: val_ty, .. } => match value {
                Value::Object(map) => {
                    for (k, v) in map {
                        val_ty.matches_at(v, table, &format!("{path}.{k}"), depth + 1)?;
                    }
                    Ok(())
                }
                other => Err(format!("{path}: expected object, got {}", kind_of(other))),
            },
            TypeRef::Enum(values) => match value {
                Value::String(s) if values.iter().any(|v| v == s) => Ok(()),
                other => Err(format!(
                    "{path}: {} is not one of the enum values",
                    kind_of(other)
                )),
            },
            TypeRef::Record { fields } => match value {
                Value::Object(map) => {
                    for field in fields {
                        match map.get(&field.name) {
                            Some(v) => field.ty.matches_at(
                                v,
                                table,
                                &format!("{path}.{}", field.name),
                                depth + 1,
                            )?,
                            None if field.required => {
                                return Err(format!(
                                    "{path}: missing required field `{}`",
                                    field.name
                                ));
                            }
                            None => {}
                        }
                    }
                    Ok(())
                }
                other => Err(format!("{path}: expected object, got {}", kind_of(other))),
            },
            TypeRef::OneOf(variants) => {
                for v in variants {
                    if v.matches_at(value, table, path, depth + 1).is_ok() {
                        return Ok(());
                    }
                }
                Err(format!("{path}: no variant matched"))
            }
            TypeRef::Ref(name) => match table.get(name) {
                Some(target) => target.matches_at(value, table, path, depth + 1),
                None => Err(format!("{path}: unresolved schema ref `{name}`")),
            },
        }
    }

    /// Lower a JSON Schema fragment (the subset used by OpenAPI components)
    /// into a `TypeRef`.
    ///
    /// Supported: `type` string/integer/number/boolean with `format`
    /// uuid/date-time/date/byte, `enum` of strings, `array` with
    /// `minItems`/`maxItems`, `object` with `properties`/`required` or
    /// `additionalProperties`, `oneOf`/`anyOf`, `nullable`, and
    /// `$ref: "#/components/schemas/Name"`.
    pub fn from_json_schema(schema: &Value) -> Result<TypeRef, CoreError> {
        let obj = schema
            .as_object()
            .ok_or_else(|| CoreError::SchemaLowering("schema must be an object".into()))?;

        if let Some(Value::String(r)) = obj.get("$ref") {
            let name = r.rsplit('/').next().unwrap_or(r);
            return Ok(TypeRef::Ref(name.to_string()));
        }

        if let Some(Value::Array(variants)) = obj.get("oneOf").or_else(|| obj.get("anyOf")) {
            let lowered = variants
                .iter()
                .map(TypeRef::from_json_schema)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(wrap_nullable(obj, TypeRef::OneOf(lowered)));
        }

        if let Some(Value::Array(values)) = obj.get("enum") {
            let strings = values
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        CoreError::SchemaLowering("non-string enum values are unsupported".into())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(wrap_nullable(obj, TypeRef::Enum(strings)));
        }

        let ty = obj.get("type").and_then(Value::as_str).unwrap_or("object");
        let format = obj.get("format").and_then(Value::as_str);
        let lowered = match (ty, format) {
            ("string", Some("uuid")) => TypeRef::UUID,
            ("string", Some("date-time")) => TypeRef::DATETIME,
            ("string", Some("date")) => TypeRef::DATE,
            ("string", Some("byte")) => TypeRef::BYTES,
            ("string", _) => TypeRef::STR,
            ("integer", _) => TypeRef::INT,
            ("number", _) => TypeRef::FLOAT,
            ("boolean", _) => TypeRef::BOOL,
            ("array", _) => {
                let item = obj
                    .get("items")
                    .map(TypeRef::from_json_schema)
                    .transpose()?
                    .unwrap_or(TypeRef::STR);
                let min = obj.get("minItems").and_then(Value::as_u64).unwrap_or(0) as usize;
                let max = obj.get("maxItems").and_then(Value::as_u64).unwrap_or(10) as usize;
                TypeRef::seq(item, min, max.max(min))
            }
            ("object", _) => {
                if let Some(Value::Object(props)) = obj.get("properties") {
                    let required: Vec<&str> = obj
                        .get("required")
                        .and_then(Value::as_array)
                        .map(|r| r.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default();
                    let mut fields = Vec::with_capacity(props.len());
                    for (name, prop) in props {
                        fields.push(Field {
                            name: name.clone(),
                            ty: TypeRef::from_json_schema(prop)?,
                            required: required.contains(&name.as_str()),
                        });
                    }
                    TypeRef::Record { fields }
                } else if let Some(additional) = obj.get("additionalProperties") {
                    let value_ty = if additional.is_object() {
                        TypeRef::from_json_schema(additional)?
                    } else {
                        TypeRef::STR
                    };
                    TypeRef::map(TypeRef::STR, value_ty, 0, 10)
                } else {
                    TypeRef::Record { fields: vec![] }
                }
            }
            (other, _) => {
                return Err(CoreError::SchemaLowering(format!(
                    "unsupported schema type `{other}`"
                )));
            }
        };
        Ok(wrap_nullable(obj, lowered))
    }
}

fn wrap_nullable(obj: &serde_json::Map<String, Value>, ty: TypeRef) -> TypeRef {
    if obj.get("nullable").and_then(Value::as_bool).unwrap_or(false) {
        TypeRef::optional(ty)
    } else {
        ty
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Primitive(p) => write!(f, "{}", p.name()),
            TypeRef::Optional(inner) => write!(f, "optional<{inner}>"),
            TypeRef::Seq { item, min, max } => write!(f, "seq<{item}>[{min}..{max}]"),
            TypeRef::Map { key, value, .. } => write!(f, "map<{key}, {value}>"),
            TypeRef::Enum(values) => write!(f, "enum[{}]", values.join(", ")),
            TypeRef::Record { fields } => {
                write!(f, "record{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field.name)?;
                }
                write!(f, "}}")
            }
            TypeRef::OneOf(variants) => write!(f, "one_of[{} variants]", variants.len()),
            TypeRef::Ref(name) => write!(f, "ref<{name}>"),
        }
    }
}

/// Named schemas referenced by `TypeRef::Ref`.
///
/// The table is the sole owner of recursive schema bodies; `Ref` nodes hold
/// only the name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaTable {
    entries: HashMap<String, TypeRef>,
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: TypeRef) {
        self.entries.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&TypeRef> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Lower an OpenAPI-style `components/schemas` object into a table.
    pub fn from_components(components: &Value) -> Result<Self, CoreError> {
        let mut table = SchemaTable::new();
        if let Some(map) = components.as_object() {
            for (name, schema) in map {
                table.insert(name.clone(), TypeRef::from_json_schema(schema)?);
            }
        }
        Ok(table)
    }
}
