//! The link graph: response-to-request data dependencies.
//!
//! A link states that a field of operation A's response can be substituted
//! into operation B's parameter, via a named bundle. Explicit links,
//! user-supplied tables and inference all produce the same row type, so the
//! runner sees a single graph.

use http::Method;
use serde_json::Value;

use smolder_core::{Primitive, ResponseData, RouteSpec, SchemaTable, TypeRef};

use crate::error::EngineError;

/// Operation identity: method plus route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpId {
    pub method: Method,
    pub path: String,
}

impl OpId {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into() }
    }

    pub fn of(route: &RouteSpec, method: &Method) -> Self {
        Self { method: method.clone(), path: route.path().to_string() }
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Which parameter of the consuming operation a bundle value feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSlot {
    Path(String),
    Query(String),
    Header(String),
    /// A top-level field of the JSON request body.
    BodyField(String),
}

impl ParamSlot {
    pub fn name(&self) -> &str {
        match self {
            ParamSlot::Path(name)
            | ParamSlot::Query(name)
            | ParamSlot::Header(name)
            | ParamSlot::BodyField(name) => name,
        }
    }
}

/// Where a produced value is pulled from in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtractSource {
    Body,
    Header(String),
}

/// A JSON-pointer-style extraction expression, e.g. `$.body#/id` or
/// `$.header#Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractExpr {
    source: ExtractSource,
    pointer: String,
}

impl ExtractExpr {
    /// Pull a top-level body field.
    pub fn body_field(name: &str) -> Self {
        Self { source: ExtractSource::Body, pointer: format!("/{name}") }
    }

    pub fn parse(expr: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidLinkExpr(expr.to_string());
        let rest = expr.strip_prefix("$.").ok_or_else(invalid)?;
        let (source, pointer) = match rest.split_once('#') {
            Some(("body", ptr)) => (ExtractSource::Body, ptr.to_string()),
            Some(("header", name)) if !name.is_empty() => {
                (ExtractSource::Header(name.to_string()), String::new())
            }
            None if rest == "body" => (ExtractSource::Body, String::new()),
            _ => return Err(invalid()),
        };
        if let ExtractSource::Body = source {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(invalid());
            }
        }
        Ok(Self { source, pointer })
    }

    /// Extract the linked value from a response.
    ///
    /// Returns `None` when the response has no such field - the producing
    /// rule then simply produces nothing.
    pub fn extract(&self, response: &ResponseData) -> Option<Value> {
        match &self.source {
            ExtractSource::Body => {
                let body = response.json()?;
                if self.pointer.is_empty() {
                    Some(body)
                } else {
                    body.pointer(&self.pointer).cloned()
                }
            }
            ExtractSource::Header(name) => response
                .headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|v| Value::String(v.to_string())),
        }
    }
}

impl std::fmt::Display for ExtractExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            ExtractSource::Body if self.pointer.is_empty() => write!(f, "$.body"),
            ExtractSource::Body => write!(f, "$.body#{}", self.pointer),
            ExtractSource::Header(name) => write!(f, "$.header#{name}"),
        }
    }
}

/// One edge of the link graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub producer: OpId,
    pub expr: ExtractExpr,
    pub bundle: String,
    pub consumer: OpId,
    pub param: ParamSlot,
}

impl Link {
    /// The edge label used by coverage counters.
    pub fn label(&self) -> String {
        format!(
            "{} -[{}]-> {} {}",
            self.producer,
            self.bundle,
            self.consumer,
            self.param.name()
        )
    }
}

/// The set of links driving stateful mode.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    links: Vec<Link>,
}

impl LinkGraph {
    /// Explicit links (from a schema) or a user-supplied table; both are
    /// just rows.
    pub fn explicit(links: Vec<Link>) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Infer edges by matching response field names and shapes against
    /// downstream parameter names and shapes.
    ///
    /// A 2xx response field feeds a parameter when the names match exactly,
    /// or the field is `id` and the parameter is `id`/`<stem>_id` where
    /// `<stem>` is the producer's trailing literal segment, singularized.
    /// Self-edges are skipped.
    pub fn infer(routes: &[RouteSpec], schemas: &SchemaTable) -> Self {
        let mut links = Vec::new();
        for producer_route in routes {
            for producer_method in producer_route.methods() {
                let producer = OpId::of(producer_route, producer_method);
                for (field_name, field_prim) in
                    producible_fields(producer_route, schemas)
                {
                    for consumer_route in routes {
                        for consumer_method in consumer_route.methods() {
                            let consumer = OpId::of(consumer_route, consumer_method);
                            if consumer == producer {
                                continue;
                            }
                            for (slot, param_ty) in consumable_params(consumer_route) {
                                if !names_match(
                                    &field_name,
                                    slot.name(),
                                    producer_route,
                                ) || !shapes_match(field_prim, &param_ty)
                                {
                                    continue;
                                }
                                links.push(Link {
                                    producer: producer.clone(),
                                    expr: ExtractExpr::body_field(&field_name),
                                    bundle: bundle_name(producer_route, &field_name),
                                    consumer: consumer.clone(),
                                    param: slot,
                                });
                            }
                        }
                    }
                }
            }
        }
        Self { links }
    }
}

/// The primitive-typed top-level fields of a route's 2xx JSON contracts.
fn producible_fields(route: &RouteSpec, schemas: &SchemaTable) -> Vec<(String, Primitive)> {
    let mut out = Vec::new();
    for contract in route.responses() {
        if !(200..300).contains(&contract.status) {
            continue;
        }
        let schema = match &contract.schema {
            TypeRef::Ref(name) => match schemas.get(name) {
                Some(target) => target,
                None => continue,
            },
            other => other,
        };
        if let TypeRef::Record { fields } = schema {
            for field in fields {
                if let TypeRef::Primitive(prim) = &field.ty {
                    out.push((field.name.clone(), *prim));
                }
            }
        }
    }
    out
}

fn consumable_params(route: &RouteSpec) -> Vec<(ParamSlot, TypeRef)> {
    let mut out = Vec::new();
    for (name, ty) in route.path_params() {
        out.push((ParamSlot::Path(name.clone()), ty.clone()));
    }
    for param in route.query_params() {
        out.push((ParamSlot::Query(param.name.clone()), param.ty.clone()));
    }
    out
}

fn names_match(field: &str, param: &str, producer: &RouteSpec) -> bool {
    if field == param {
        return true;
    }
    if field != "id" {
        return false;
    }
    param == "id"
        || producer_stem(producer).is_some_and(|stem| param == format!("{stem}_id"))
}

/// Shape compatibility: identical primitives, or either side is a string
/// (rendered values always have a string form).
fn shapes_match(field: Primitive, param_ty: &TypeRef) -> bool {
    match param_ty {
        TypeRef::Primitive(param) => {
            field == *param || field == Primitive::Str || *param == Primitive::Str
        }
        TypeRef::Optional(inner) => shapes_match(field, inner),
        _ => false,
    }
}

/// Singular of the producer's last literal path segment: `/users` → `user`.
fn producer_stem(route: &RouteSpec) -> Option<String> {
    route
        .pattern()
        .segments()
        .iter()
        .rev()
        .find_map(|segment| match segment {
            smolder_core::Segment::Literal(lit) if !lit.is_empty() => Some(lit.clone()),
            _ => None,
        })
        .map(|lit| lit.strip_suffix('s').map(str::to_string).unwrap_or(lit))
}

fn bundle_name(producer: &RouteSpec, field: &str) -> String {
    match producer_stem(producer) {
        Some(stem) => format!("{stem}_{field}s"),
        None => format!("{field}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use smolder_core::Field;

    fn response(body: &str) -> ResponseData {
        ResponseData::new(StatusCode::OK, HeaderMap::new(), body.as_bytes().to_vec())
    }

    #[test]
    fn parses_body_pointer_expressions() {
        let expr = ExtractExpr::parse("$.body#/id").unwrap();
        assert_eq!(expr, ExtractExpr::body_field("id"));
        assert_eq!(
            expr.extract(&response(r#"{"id": 7}"#)),
            Some(Value::from(7))
        );
        assert_eq!(expr.extract(&response(r#"{"name": "x"}"#)), None);
        assert_eq!(expr.extract(&response("not json")), None);
    }

    #[test]
    fn parses_header_expressions() {
        let expr = ExtractExpr::parse("$.header#Location").unwrap();
        let mut resp = response("");
        resp.headers.insert("location", "/users/9".parse().unwrap());
        assert_eq!(
            expr.extract(&resp),
            Some(Value::String("/users/9".into()))
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["body#/id", "$.body#id", "$.cookie#x", "$.header#"] {
            assert!(ExtractExpr::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn infers_id_to_path_param_links() {
        let routes = vec![
            RouteSpec::builder("/users")
                .method(Method::POST)
                .body(TypeRef::record(vec![Field::required("name", TypeRef::STR)]))
                .respond(
                    201,
                    "application/json",
                    TypeRef::record(vec![Field::required("id", TypeRef::INT)]),
                )
                .build()
                .unwrap(),
            RouteSpec::builder("/users/{user_id:int}")
                .method(Method::GET)
                .build()
                .unwrap(),
        ];
        let graph = LinkGraph::infer(&routes, &SchemaTable::new());
        assert_eq!(graph.links().len(), 1);
        let link = &graph.links()[0];
        assert_eq!(link.producer, OpId::new(Method::POST, "/users"));
        assert_eq!(link.consumer, OpId::new(Method::GET, "/users/{user_id:int}"));
        assert_eq!(link.param, ParamSlot::Path("user_id".into()));
        assert_eq!(link.bundle, "user_ids");
    }

    #[test]
    fn inference_skips_shape_mismatches() {
        let routes = vec![
            RouteSpec::builder("/things")
                .method(Method::POST)
                .body(TypeRef::record(vec![]))
                .respond(
                    200,
                    "application/json",
                    TypeRef::record(vec![Field::required("count", TypeRef::INT)]),
                )
                .build()
                .unwrap(),
            RouteSpec::builder("/search")
                .method(Method::GET)
                .query("count", TypeRef::BOOL, false)
                .build()
                .unwrap(),
        ];
        let graph = LinkGraph::infer(&routes, &SchemaTable::new());
        assert!(graph.is_empty());
    }
}
