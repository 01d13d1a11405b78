//! In-process HTTP transport over a `tower::Service`.
//!
//! Wraps an assembled `axum::Router` (or any compatible service) and
//! dispatches requests through `tower::ServiceExt::oneshot`, without binding
//! a TCP port. This is the transport a test embeds to smoke its own app:
//!
//! ```ignore
//! let app: axum::Router = build_app();
//! let engine = Engine::new(Arc::new(TowerTransport::new(app)));
//! let report = engine.run(&routes, &RouteFilter::all()).await;
//! assert!(report.all_passed());
//! ```

use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::Request;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use smolder_core::{RequestPlan, ResponseData};
use smolder_engine::{Transport, TransportError};

/// Transport that drives an `axum::Router` in-process.
///
/// The router is cloned per request (axum routers are cheap to clone), so a
/// single transport serves any number of sequential trials.
pub struct TowerTransport {
    router: Router,
}

impl TowerTransport {
    /// Wrap an assembled router.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    fn build_request(plan: &RequestPlan) -> Result<Request<Body>, TransportError> {
        let mut builder = Request::builder().method(plan.method.clone()).uri(plan.uri());
        for (name, value) in &plan.headers {
            builder = builder.header(name, value);
        }
        let body = match &plan.body {
            Some(body) => Body::from(body.bytes.clone()),
            None => Body::empty(),
        };
        builder
            .body(body)
            .map_err(|err| TransportError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl Transport for TowerTransport {
    async fn send(&self, plan: &RequestPlan) -> Result<ResponseData, TransportError> {
        let request = Self::build_request(plan)?;
        let router = self.router.clone();
        let started = Instant::now();

        let response = router
            .oneshot(request)
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|err| TransportError::Malformed(err.to_string()))?
            .to_bytes();

        let mut data = ResponseData::new(parts.status, parts.headers, bytes);
        data.elapsed = Some(started.elapsed());
        Ok(data)
    }
}
