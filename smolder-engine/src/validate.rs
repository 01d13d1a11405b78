//! Response validators.
//!
//! A validator is a pure predicate on `(response, route)` returning a
//! verdict with diagnostics; validators compose and never mutate shared
//! state.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use smolder_core::{ResponseData, RouteSpec, SchemaTable};

/// The class of a failing trial; shrinking preserves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Server5xx,
    UnexpectedStatus,
    SchemaViolation,
    ContentTypeViolation,
    /// Transport error (connection failure, timeout); no response exists.
    ServerUnreachable,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Server5xx => "server_5xx",
            FailureKind::UnexpectedStatus => "unexpected_status",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::ContentTypeViolation => "content_type_violation",
            FailureKind::ServerUnreachable => "server_unreachable",
        };
        write!(f, "{name}")
    }
}

/// One diagnostic produced by a validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregated outcome of validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self { valid: true, errors: Vec::new(), warnings: Vec::new() }
    }

    pub fn fail(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![ValidationIssue { kind, message: message.into() }],
            warnings: Vec::new(),
        }
    }

    /// The class of the first error; drives same-kind shrinking.
    pub fn primary_kind(&self) -> Option<FailureKind> {
        self.errors.first().map(|issue| issue.kind)
    }
}

/// Predicate on (response, route).
pub trait Validator: Send + Sync {
    fn validate(&self, response: &ResponseData, route: &RouteSpec) -> Verdict;
}

/// Which status codes a [`StatusValidator`] accepts.
///
/// There is no silent default: callers pick a policy explicitly. The engine
/// constructs [`StatusValidator::fail_on_5xx`] (allow 100-499) unless told
/// otherwise; the stricter 2xx-4xx reading some contracts use is available
/// through `allow_ranges`.
#[derive(Debug, Clone)]
pub enum AllowedStatus {
    /// Everything below 500.
    NonServerError,
    /// An explicit set of codes.
    Set(BTreeSet<u16>),
    /// Inclusive ranges, e.g. `[(200, 499)]`.
    Ranges(Vec<(u16, u16)>),
}

impl AllowedStatus {
    fn allows(&self, status: u16) -> bool {
        match self {
            AllowedStatus::NonServerError => status < 500,
            AllowedStatus::Set(set) => set.contains(&status),
            AllowedStatus::Ranges(ranges) => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&status))
            }
        }
    }
}

/// Rejects responses whose status is outside the allowed policy.
#[derive(Debug, Clone)]
pub struct StatusValidator {
    allowed: AllowedStatus,
}

impl StatusValidator {
    /// Allow every non-5xx status. This is the engine default.
    pub fn fail_on_5xx() -> Self {
        Self { allowed: AllowedStatus::NonServerError }
    }

    pub fn allow_set(codes: impl IntoIterator<Item = u16>) -> Self {
        Self { allowed: AllowedStatus::Set(codes.into_iter().collect()) }
    }

    pub fn allow_ranges(ranges: Vec<(u16, u16)>) -> Self {
        Self { allowed: AllowedStatus::Ranges(ranges) }
    }
}

impl Validator for StatusValidator {
    fn validate(&self, response: &ResponseData, _route: &RouteSpec) -> Verdict {
        let status = response.status.as_u16();
        if self.allowed.allows(status) {
            return Verdict::pass();
        }
        let kind = if status >= 500 {
            FailureKind::Server5xx
        } else {
            FailureKind::UnexpectedStatus
        };
        Verdict::fail(kind, format!("status {status} is not allowed"))
    }
}

/// Rejects responses whose `Content-Type` matches none of a declared list.
///
/// Responses without a body (204, HEAD answers) are exempt.
#[derive(Debug, Clone)]
pub struct ContentTypeValidator {
    allowed: Vec<String>,
}

impl ContentTypeValidator {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { allowed: allowed.into_iter().map(Into::into).collect() }
    }

    pub fn json_only() -> Self {
        Self::new(["application/json"])
    }
}

impl Validator for ContentTypeValidator {
    fn validate(&self, response: &ResponseData, _route: &RouteSpec) -> Verdict {
        if response.body.is_empty() {
            return Verdict::pass();
        }
        match response.content_type() {
            Some(ct) if self.allowed.iter().any(|a| a == ct) => Verdict::pass(),
            Some(ct) => Verdict::fail(
                FailureKind::ContentTypeViolation,
                format!("content type `{ct}` is not declared"),
            ),
            None => Verdict::fail(
                FailureKind::ContentTypeViolation,
                "response has a body but no Content-Type header",
            ),
        }
    }
}

/// Checks the response body against the route's declared schema for the
/// observed status.
///
/// Routes or statuses without a declared contract pass vacuously.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schemas: SchemaTable,
}

impl SchemaValidator {
    pub fn new(schemas: SchemaTable) -> Self {
        Self { schemas }
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, response: &ResponseData, route: &RouteSpec) -> Verdict {
        let Some(contract) = route.response_for(response.status.as_u16()) else {
            return Verdict::pass();
        };
        if contract.content_type != "application/json" {
            return Verdict::pass();
        }
        let Some(body) = response.json() else {
            return Verdict::fail(
                FailureKind::SchemaViolation,
                "response body is not valid JSON",
            );
        };
        match contract.schema.matches_json(&body, &self.schemas) {
            Ok(()) => Verdict::pass(),
            Err(reason) => Verdict::fail(FailureKind::SchemaViolation, reason),
        }
    }
}

/// Runs children in order; invalid iff any child is invalid, with all
/// diagnostics aggregated.
#[derive(Clone, Default)]
pub struct CompositeValidator {
    children: Vec<Arc<dyn Validator>>,
}

impl CompositeValidator {
    pub fn new(children: Vec<Arc<dyn Validator>>) -> Self {
        Self { children }
    }

    pub fn push(mut self, child: Arc<dyn Validator>) -> Self {
        self.children.push(child);
        self
    }
}

impl Validator for CompositeValidator {
    fn validate(&self, response: &ResponseData, route: &RouteSpec) -> Verdict {
        let mut out = Verdict::pass();
        for child in &self.children {
            let verdict = child.validate(response, route);
            out.valid = out.valid && verdict.valid;
            out.errors.extend(verdict.errors);
            out.warnings.extend(verdict.warnings);
        }
        out
    }
}
