//! Shared build-send-validate path for stateless trials and stateful steps.

use std::time::Duration;

use http::Method;

use smolder_core::{CoreError, RequestPlan, ResponseData, RouteSpec};

use crate::auth::AuthDecorator;
use crate::draw::{build_plan, RouteValues};
use crate::transport::{Transport, TransportError};
use crate::validate::{FailureKind, Validator, Verdict};

/// Everything observed about one executed request.
pub(crate) struct ExecOutcome {
    pub plan: RequestPlan,
    /// Absent on transport errors.
    pub response: Option<ResponseData>,
    pub verdict: Verdict,
    pub transport_error: Option<TransportError>,
}

impl ExecOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.verdict.valid {
            None
        } else {
            self.verdict.primary_kind()
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.transport_error, Some(TransportError::Timeout))
    }
}

/// Render, authorize, send and validate one request.
///
/// Transport errors become failing verdicts of kind `server_unreachable`;
/// only unencodable values (an `Err`) abort without an outcome.
pub(crate) async fn execute(
    transport: &dyn Transport,
    route: &RouteSpec,
    method: &Method,
    values: &RouteValues,
    auth: &AuthDecorator,
    validator: &dyn Validator,
    timeout: Duration,
) -> Result<ExecOutcome, CoreError> {
    let mut plan = build_plan(route, method, values, timeout)?;
    if let Err(err) = auth.apply(&mut plan) {
        // Preflight passed earlier, so the credential vanished mid-run;
        // treat it like the server being unreachable for this request.
        return Ok(ExecOutcome {
            plan,
            response: None,
            verdict: Verdict::fail(FailureKind::ServerUnreachable, err.to_string()),
            transport_error: None,
        });
    }

    let sent = tokio::time::timeout(timeout, transport.send(&plan)).await;
    let result = match sent {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    };

    Ok(match result {
        Ok(response) => {
            let verdict = validator.validate(&response, route);
            ExecOutcome { plan, response: Some(response), verdict, transport_error: None }
        }
        Err(err) => ExecOutcome {
            plan,
            response: None,
            verdict: Verdict::fail(FailureKind::ServerUnreachable, err.to_string()),
            transport_error: Some(err),
        },
    })
}
