//! The wire contracts between the engine and a transport.
//!
//! The engine produces [`RequestPlan`]s and consumes [`ResponseData`]; no
//! framework or client types cross this boundary.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use crate::encode::encode_query;

/// A serialized request body with its content type.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Bytes,
}

impl RequestBody {
    pub fn json(bytes: impl Into<Bytes>) -> Self {
        Self { content_type: "application/json".into(), bytes: bytes.into() }
    }
}

/// A fully-rendered request, ready for a transport to send.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    /// Uppercase method token.
    pub method: Method,
    /// Already-encoded path starting with `/`.
    pub path: String,
    /// Ordered (name, rendered value) pairs; repeated names allowed.
    pub query: Vec<(String, String)>,
    /// Case-insensitive header map; auth headers are injected last.
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl RequestPlan {
    pub fn new(method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    /// The request target: path plus serialized query string.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, encode_query(&self.query))
        }
    }

    /// Stable fingerprint over method, target, canonicalized headers and
    /// body bytes. Equal requests fingerprint equally across runs.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a::new();
        h.write(self.method.as_str().as_bytes());
        h.write(b"\n");
        h.write(self.uri().as_bytes());
        h.write(b"\n");
        for (name, value) in canonical_headers(&self.headers) {
            h.write(name.as_bytes());
            h.write(b":");
            h.write(value.as_bytes());
            h.write(b"\n");
        }
        if let Some(body) = &self.body {
            h.write(body.content_type.as_bytes());
            h.write(b"\n");
            h.write(&body.bytes);
        }
        h.finish()
    }
}

/// A transport's answer, normalized for validation and reporting.
#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Monotonic request duration when the transport can measure one.
    pub elapsed: Option<Duration>,
}

impl ResponseData {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), elapsed: None }
    }

    /// The `Content-Type` value without parameters (`; charset=...`).
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// Parse the body as JSON if possible.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Stable hash of the body bytes.
    pub fn body_hash(&self) -> u64 {
        let mut h = Fnv1a::new();
        h.write(&self.body);
        h.finish()
    }

    /// Body as UTF-8 text, truncated for reports.
    pub fn text_truncated(&self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.len() <= max {
            text.into_owned()
        } else {
            let mut end = max;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... ({} bytes)", &text[..end], self.body.len())
        }
    }
}

/// Lowercased, sorted header pairs for hashing and byte-for-byte report
/// comparison.
pub fn canonical_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
}

/// FNV-1a, 64-bit. Small, dependency-free and stable across platforms,
/// which is all the fingerprints need.
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_appends_query() {
        let mut plan = RequestPlan::new(Method::GET, "/items/3", Duration::from_secs(1));
        assert_eq!(plan.uri(), "/items/3");
        plan.query.push(("q".into(), "x y".into()));
        assert_eq!(plan.uri(), "/items/3?q=x+y");
    }

    #[test]
    fn fingerprint_ignores_header_case_and_order() {
        let mut a = RequestPlan::new(Method::GET, "/x", Duration::from_secs(1));
        a.headers.insert("X-One", "1".parse().unwrap());
        a.headers.insert("X-Two", "2".parse().unwrap());

        let mut b = RequestPlan::new(Method::GET, "/x", Duration::from_secs(1));
        b.headers.insert("x-two", "2".parse().unwrap());
        b.headers.insert("x-one", "1".parse().unwrap());

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_bodies() {
        let mut a = RequestPlan::new(Method::POST, "/x", Duration::from_secs(1));
        a.body = Some(RequestBody::json(&b"{\"a\":1}"[..]));
        let mut b = a.clone();
        b.body = Some(RequestBody::json(&b"{\"a\":2}"[..]));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn truncation_is_utf8_safe() {
        let resp = ResponseData::new(StatusCode::OK, HeaderMap::new(), "héllo wörld".as_bytes().to_vec());
        let t = resp.text_truncated(6);
        assert!(t.starts_with("héll") || t.starts_with("hél"));
    }
}
