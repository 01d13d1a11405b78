//! Run results and failure reports emitted to the host test runner.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use smolder_core::{canonical_headers, RequestPlan, ResponseData};
use smolder_gen::DrawTree;

use crate::validate::{FailureKind, ValidationIssue};

/// Outcome of a single trial.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Observed status; absent on transport errors.
    pub status: Option<u16>,
    /// Request latency in milliseconds when the transport measured one.
    pub latency_ms: Option<u64>,
    /// Stable hash of the response body.
    pub body_hash: Option<u64>,
    pub valid: bool,
    /// Stable fingerprint of the rendered request.
    pub request_fingerprint: u64,
    /// The trial's draw tree, when `keep_draw_trees` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_tree: Option<DrawTree>,
}

/// A concrete request as it went on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RenderedRequest {
    pub fn from_plan(plan: &RequestPlan) -> Self {
        Self {
            method: plan.method.to_string(),
            uri: plan.uri(),
            headers: canonical_headers(&plan.headers),
            body: plan
                .body
                .as_ref()
                .map(|body| String::from_utf8_lossy(&body.bytes).into_owned()),
        }
    }
}

/// A response as captured for the report (body truncated).
#[derive(Debug, Clone, Serialize)]
pub struct RenderedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RenderedResponse {
    pub fn from_response(response: &ResponseData) -> Self {
        Self {
            status: response.status.as_u16(),
            headers: canonical_headers(&response.headers),
            body: response.text_truncated(2048),
        }
    }
}

/// One executed step of a stateful sequence, for failure context.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub operation: String,
    pub request: RenderedRequest,
    pub status: Option<u16>,
}

/// Everything the outer runner needs to reproduce and display a failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// `METHOD /pattern`.
    pub operation: String,
    pub kind: FailureKind,
    pub errors: Vec<ValidationIssue>,
    /// The shrunk, decoded parameter values (path, query, header, body).
    pub values: serde_json::Value,
    pub request: RenderedRequest,
    /// Absent when the failure is a transport error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RenderedResponse>,
    pub seed: u64,
    pub trial_index: u32,
    /// The minimal failing draw tree, when `keep_draw_trees` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_tree: Option<DrawTree>,
    /// Stateful mode: the prior steps of the shrunk sequence, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

/// Aggregated outcome for one (route, method).
#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    pub operation: String,
    pub trials: u32,
    pub passed: u32,
    /// Trial count per observed status code.
    pub status_counts: BTreeMap<u16, u32>,
    /// Per-trial results in execution order.
    pub results: Vec<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    /// A route-fatal error (unsupported type, missing credential); no
    /// trials ran past it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub elapsed_ms: u64,
}

impl RouteReport {
    pub fn fatal(operation: String, error: impl std::fmt::Display) -> Self {
        Self {
            operation,
            trials: 0,
            passed: 0,
            status_counts: BTreeMap::new(),
            results: Vec::new(),
            failure: None,
            fatal: Some(error.to_string()),
            elapsed_ms: 0,
        }
    }

    pub fn passed_clean(&self) -> bool {
        self.failure.is_none() && self.fatal.is_none()
    }
}

/// The whole run, over every selected route.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub routes: Vec<RouteReport>,
    pub total_trials: u64,
    pub total_failures: u32,
    /// The filter selected nothing; reported as a warning, not an error.
    pub no_applicable_routes: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(routes: Vec<RouteReport>, elapsed: Duration) -> Self {
        let total_trials = routes.iter().map(|r| u64::from(r.trials)).sum();
        let total_failures = routes
            .iter()
            .filter(|r| r.failure.is_some() || r.fatal.is_some())
            .count() as u32;
        Self {
            no_applicable_routes: routes.is_empty(),
            routes,
            total_trials,
            total_failures,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.total_failures == 0
    }
}

/// Stateful-mode coverage counters. Reported, never part of the verdict.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Coverage {
    /// Successful firings per operation.
    pub operations: BTreeMap<String, u32>,
    /// Traversals per link edge.
    pub links: BTreeMap<String, u32>,
}

/// Outcome of a stateful run.
#[derive(Debug, Clone, Serialize)]
pub struct StatefulReport {
    pub sequences: u32,
    pub steps_executed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    pub coverage: Coverage,
    /// The total timeout ended the run early; results are partial.
    pub timed_out: bool,
    pub elapsed_ms: u64,
    /// A run-fatal error (unresolvable generator, missing credential); no
    /// sequences ran past it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}
