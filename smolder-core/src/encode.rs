//! Rendering drawn values into concrete request parts.
//!
//! Path segments are percent-encoded per the RFC 3986 `pchar` rules; query
//! strings go through `form_urlencoded` so `+`/`%` handling matches what
//! servers decode.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::CoreError;
use crate::route::{PathPattern, Segment};
use crate::value::GenValue;

/// Everything outside RFC 3986 `pchar` (unreserved / sub-delims / `:` / `@`)
/// is escaped inside a path segment. `/` in particular is always escaped so
/// a drawn value can never add path segments.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode one path segment.
pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// Substitute placeholder values into a pattern, producing a concrete
/// request path starting with `/`.
///
/// Values render canonically (decimal integers, lowercase hyphenated UUIDs,
/// `true`/`false`, RFC 3339 datetimes); string values are percent-encoded.
/// A value that encodes to an empty segment is rejected - it would collapse
/// the path and route somewhere else entirely.
pub fn encode_path(
    pattern: &PathPattern,
    values: &[(String, GenValue)],
) -> Result<String, CoreError> {
    let mut out = String::new();
    for segment in pattern.segments() {
        out.push('/');
        match segment {
            Segment::Literal(lit) => out.push_str(lit),
            Segment::Param(name) => {
                let value = values
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| CoreError::MissingPathValue { name: name.clone() })?;
                let raw = value
                    .render_scalar()
                    .ok_or_else(|| CoreError::EmptyPathSegment { name: name.clone() })?;
                let encoded = encode_segment(&raw);
                if encoded.is_empty() {
                    return Err(CoreError::EmptyPathSegment { name: name.clone() });
                }
                out.push_str(&encoded);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Serialize ordered query pairs. Repeated names are allowed.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    let mut ser = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        ser.append_pair(name, value);
    }
    ser.finish()
}

/// Decode one percent-encoded path segment back to its raw text.
///
/// Inverse of [`encode_segment`] for valid UTF-8 inputs; used by the
/// round-trip tests and by link-field extraction from request paths.
pub fn decode_segment(encoded: &str) -> String {
    percent_encoding::percent_decode_str(encoded)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::PathPattern;

    fn pattern(p: &str) -> PathPattern {
        PathPattern::parse(p).unwrap().0
    }

    #[test]
    fn substitutes_and_encodes() {
        let p = pattern("/items/{id}/notes/{slug}");
        let path = encode_path(
            &p,
            &[
                ("id".into(), GenValue::Int(42)),
                ("slug".into(), GenValue::Str("a b/c".into())),
            ],
        )
        .unwrap();
        assert_eq!(path, "/items/42/notes/a%20b%2Fc");
    }

    #[test]
    fn rejects_empty_segment() {
        let p = pattern("/items/{id}");
        let err = encode_path(&p, &[("id".into(), GenValue::Str(String::new()))]).unwrap_err();
        assert!(matches!(err, CoreError::EmptyPathSegment { .. }));
    }

    #[test]
    fn rejects_missing_value() {
        let p = pattern("/items/{id}");
        let err = encode_path(&p, &[]).unwrap_err();
        assert!(matches!(err, CoreError::MissingPathValue { .. }));
    }

    #[test]
    fn segment_round_trips() {
        for raw in ["plain", "a b", "x/y", "100%", "naïve", "q?a=b"] {
            assert_eq!(decode_segment(&encode_segment(raw)), raw);
        }
    }

    #[test]
    fn query_serialization_keeps_order_and_repeats() {
        let q = encode_query(&[
            ("a".into(), "1".into()),
            ("b".into(), "x y".into()),
            ("a".into(), "2".into()),
        ]);
        assert_eq!(q, "a=1&b=x+y&a=2");
    }
}
