//! The normalized, framework-agnostic description of one endpoint.
//!
//! Extractors produce `RouteSpec`s; the core consumes them read-only. All
//! structural invariants are enforced at build time so the engine never has
//! to re-validate mid-run.

use std::collections::BTreeSet;

use http::Method;

use crate::error::CoreError;
use crate::typeref::TypeRef;

/// One segment of a parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// A `{name}` or `{name:tag}` placeholder.
    Param(String),
}

/// A parsed route pattern: literal segments and named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern such as `/users/{id:int}/posts/{slug}`.
    ///
    /// Returns the pattern plus the `(name, tag)` pairs found, in order of
    /// appearance. Tags are resolved to `TypeRef`s by the route builder.
    pub fn parse(pattern: &str) -> Result<(Self, Vec<(String, Option<String>)>), CoreError> {
        if !pattern.starts_with('/') {
            return Err(CoreError::PatternSyntax {
                pattern: pattern.to_string(),
                reason: "pattern must start with `/`".into(),
            });
        }
        let mut segments = Vec::new();
        let mut params = Vec::new();
        for raw_seg in pattern.split('/').skip(1) {
            if raw_seg.starts_with('{') && raw_seg.ends_with('}') {
                let inner = &raw_seg[1..raw_seg.len() - 1];
                let (name, tag) = match inner.split_once(':') {
                    Some((n, t)) => (n, Some(t.to_string())),
                    None => (inner, None),
                };
                if name.is_empty() {
                    return Err(CoreError::PatternSyntax {
                        pattern: pattern.to_string(),
                        reason: "empty placeholder name".into(),
                    });
                }
                segments.push(Segment::Param(name.to_string()));
                params.push((name.to_string(), tag));
            } else if raw_seg.contains('{') || raw_seg.contains('}') {
                return Err(CoreError::PatternSyntax {
                    pattern: pattern.to_string(),
                    reason: format!("malformed segment `{raw_seg}`"),
                });
            } else {
                segments.push(Segment::Literal(raw_seg.to_string()));
            }
        }
        Ok((Self { raw: pattern.to_string(), segments }, params))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// A query parameter declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: String,
    pub ty: TypeRef,
    pub required: bool,
}

/// A declared response shape for one (status, content-type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContract {
    pub status: u16,
    pub content_type: String,
    pub schema: TypeRef,
}

/// The normalized endpoint descriptor consumed by the engine.
///
/// Immutable after construction; build it with [`RouteSpec::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pattern: PathPattern,
    methods: Vec<Method>,
    path_params: Vec<(String, TypeRef)>,
    query_params: Vec<QueryParam>,
    header_params: Vec<(String, TypeRef)>,
    body: Option<TypeRef>,
    responses: Vec<ResponseContract>,
    tags: BTreeSet<String>,
    name: Option<String>,
    description: Option<String>,
    deprecated: bool,
}

impl RouteSpec {
    pub fn builder(pattern: &str) -> RouteSpecBuilder {
        RouteSpecBuilder::new(pattern)
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn path(&self) -> &str {
        self.pattern.raw()
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Path parameters in order of appearance in the pattern.
    pub fn path_params(&self) -> &[(String, TypeRef)] {
        &self.path_params
    }

    pub fn query_params(&self) -> &[QueryParam] {
        &self.query_params
    }

    pub fn header_params(&self) -> &[(String, TypeRef)] {
        &self.header_params
    }

    pub fn body(&self) -> Option<&TypeRef> {
        self.body.as_ref()
    }

    pub fn responses(&self) -> &[ResponseContract] {
        &self.responses
    }

    /// The declared response schema for an observed status, if any.
    pub fn response_for(&self, status: u16) -> Option<&ResponseContract> {
        self.responses.iter().find(|r| r.status == status)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn deprecated(&self) -> bool {
        self.deprecated
    }

    /// `METHOD /pattern` identity used in reports and link graphs.
    pub fn operation_id(&self, method: &Method) -> String {
        format!("{method} {}", self.pattern.raw())
    }
}

/// True for methods that may carry a request body.
pub fn method_allows_body(method: &Method) -> bool {
    !matches!(method.as_str(), "GET" | "HEAD" | "DELETE" | "OPTIONS")
}

/// Fluent builder for [`RouteSpec`]; `build` enforces the invariants.
pub struct RouteSpecBuilder {
    pattern: String,
    methods: Vec<Method>,
    path_params: Vec<(String, TypeRef)>,
    query_params: Vec<QueryParam>,
    header_params: Vec<(String, TypeRef)>,
    body: Option<TypeRef>,
    responses: Vec<ResponseContract>,
    tags: BTreeSet<String>,
    name: Option<String>,
    description: Option<String>,
    deprecated: bool,
}

impl RouteSpecBuilder {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            path_params: Vec::new(),
            query_params: Vec::new(),
            header_params: Vec::new(),
            body: None,
            responses: Vec::new(),
            tags: BTreeSet::new(),
            name: None,
            description: None,
            deprecated: false,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Declare (or override) the type of a path placeholder.
    pub fn path_param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        if let Some(slot) = self.path_params.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = ty;
        } else {
            self.path_params.push((name, ty));
        }
        self
    }

    pub fn query(mut self, name: impl Into<String>, ty: TypeRef, required: bool) -> Self {
        self.query_params.push(QueryParam { name: name.into(), ty, required });
        self
    }

    pub fn header(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.header_params.push((name.into(), ty));
        self
    }

    pub fn body(mut self, ty: TypeRef) -> Self {
        self.body = Some(ty);
        self
    }

    pub fn respond(mut self, status: u16, content_type: impl Into<String>, schema: TypeRef) -> Self {
        self.responses.push(ResponseContract {
            status,
            content_type: content_type.into(),
            schema,
        });
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn build(self) -> Result<RouteSpec, CoreError> {
        let (pattern, parsed_params) = PathPattern::parse(&self.pattern)?;
        let invalid = |reason: String| CoreError::InvalidRouteSpec {
            route: self.pattern.clone(),
            reason,
        };

        if self.methods.is_empty() {
            return Err(invalid("at least one method is required".into()));
        }

        // Placeholder names must be unique within the pattern.
        let mut seen = BTreeSet::new();
        for (name, _) in &parsed_params {
            if !seen.insert(name.clone()) {
                return Err(invalid(format!("duplicate placeholder `{name}`")));
            }
        }

        // Every declared path param must appear in the pattern.
        for (name, _) in &self.path_params {
            if !seen.contains(name) {
                return Err(invalid(format!(
                    "declared path parameter `{name}` does not appear in the pattern"
                )));
            }
        }

        // Bind each placeholder: explicit declaration wins over the tag;
        // untyped and untagged placeholders default to Str with a warning.
        let mut path_params = Vec::with_capacity(parsed_params.len());
        for (name, tag) in &parsed_params {
            let declared = self.path_params.iter().find(|(n, _)| n == name).map(|(_, t)| t);
            let ty = match (declared, tag) {
                (Some(ty), _) => ty.clone(),
                (None, Some(tag)) => TypeRef::from_tag(tag).ok_or_else(|| {
                    invalid(format!("unknown converter tag `{tag}` on `{name}`"))
                })?,
                (None, None) => {
                    tracing::warn!(
                        route = %self.pattern,
                        param = %name,
                        "path parameter has no declared type, defaulting to str"
                    );
                    TypeRef::STR
                }
            };
            path_params.push((name.clone(), ty));
        }

        // Placeholder names must not collide with query or header names.
        for q in &self.query_params {
            if seen.contains(&q.name) {
                return Err(invalid(format!(
                    "query parameter `{}` collides with a path placeholder",
                    q.name
                )));
            }
        }
        for (h, _) in &self.header_params {
            if seen.contains(h) {
                return Err(invalid(format!(
                    "header `{h}` collides with a path placeholder"
                )));
            }
        }

        // A body is only meaningful on body-carrying methods.
        if self.body.is_some() && !self.methods.iter().any(method_allows_body) {
            return Err(invalid(
                "body declared but no method of this route may carry one".into(),
            ));
        }

        Ok(RouteSpec {
            pattern,
            methods: self.methods,
            path_params,
            query_params: self.query_params,
            header_params: self.header_params,
            body: self.body,
            responses: self.responses,
            tags: self.tags,
            name: self.name,
            description: self.description,
            deprecated: self.deprecated,
        })
    }
}
