//! The single-route property loop and the run orchestrator.
//!
//! Trials are strictly sequential within a route: trial `i+1` never starts
//! until trial `i`'s response is in (or timed out), so request fingerprints
//! map 1:1 to observed responses. Each trial derives its own RNG from the
//! run seed and trial index, which makes whole runs replayable.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use http::Method;

use smolder_core::{CoreError, RouteFilter, RouteSpec};
use smolder_gen::{child_seed, rng_for, shrink, DrawCtx, RegistrySnapshot, TypeRegistry};

use crate::auth::{AuthDecorator, AuthTable};
use crate::draw::{preflight_types, RouteDraw, RouteValues};
use crate::exec::{execute, ExecOutcome};
use crate::report::{
    FailureReport, RenderedRequest, RenderedResponse, RouteReport, RunReport, RunResult,
};
use crate::settings::RunSettings;
use crate::transport::Transport;
use crate::validate::{FailureKind, StatusValidator, Validator};

/// Runs up to `max_examples` randomized trials for one (route, method) and
/// shrinks the first failure to a local minimum.
pub struct TrialRunner<'a> {
    pub route: &'a RouteSpec,
    pub method: Method,
    pub registry: RegistrySnapshot,
    pub validator: Arc<dyn Validator>,
    pub auth: AuthDecorator,
    pub transport: &'a dyn Transport,
    pub settings: RunSettings,
    /// Seed-tree lane; the orchestrator numbers (route, method) pairs.
    pub route_index: u64,
}

impl TrialRunner<'_> {
    pub async fn run(&self) -> RouteReport {
        let started = Instant::now();
        let operation = self.route.operation_id(&self.method);

        if let Err(err) = preflight_types(self.route, &self.registry) {
            return RouteReport::fatal(operation, crate::EngineError::from(err));
        }
        let draw = match RouteDraw::resolve(self.route, &self.registry) {
            Ok(draw) => draw,
            Err(err) => return RouteReport::fatal(operation, crate::EngineError::from(err)),
        };
        if let Err(err) = self.auth.preflight() {
            return RouteReport::fatal(operation, err);
        }

        let mut status_counts: BTreeMap<u16, u32> = BTreeMap::new();
        let mut results = Vec::with_capacity(self.settings.max_examples as usize);
        let mut trials = 0u32;
        let mut passed = 0u32;
        let mut failure = None;

        for trial_index in 0..self.settings.max_examples {
            let seed = child_seed(self.settings.seed, self.route_index, u64::from(trial_index));
            let mut rng = rng_for(seed);
            let mut ctx =
                DrawCtx::new(&mut rng, self.settings.size, self.registry.max_ref_depth());
            let (values, tree) = draw.draw(&mut ctx);

            let outcome = match self.execute(&values).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // A user generator produced something unencodable; the
                    // trial is discarded, not failed.
                    tracing::warn!(operation = %operation, error = %err, "discarding trial");
                    continue;
                }
            };
            trials += 1;
            if let Some(response) = &outcome.response {
                *status_counts.entry(response.status.as_u16()).or_insert(0) += 1;
            }
            results.push(RunResult {
                status: outcome.response.as_ref().map(|r| r.status.as_u16()),
                latency_ms: outcome
                    .response
                    .as_ref()
                    .and_then(|r| r.elapsed)
                    .map(|d| d.as_millis() as u64),
                body_hash: outcome.response.as_ref().map(|r| r.body_hash()),
                valid: outcome.verdict.valid,
                request_fingerprint: outcome.plan.fingerprint(),
                draw_tree: self.settings.keep_draw_trees.then(|| tree.clone()),
            });

            match outcome.failure_kind() {
                None => passed += 1,
                Some(kind) => {
                    tracing::debug!(
                        operation = %operation,
                        trial = trial_index,
                        kind = %kind,
                        "failing trial found, shrinking"
                    );
                    failure = Some(
                        self.shrink_failure(&draw, tree, values, outcome, kind, trial_index)
                            .await,
                    );
                    break;
                }
            }
        }

        RouteReport {
            operation,
            trials,
            passed,
            status_counts,
            results,
            failure,
            fatal: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Build, authorize, send and validate one request.
    async fn execute(&self, values: &RouteValues) -> Result<ExecOutcome, CoreError> {
        execute(
            self.transport,
            self.route,
            &self.method,
            values,
            &self.auth,
            self.validator.as_ref(),
            self.settings.per_trial_timeout,
        )
        .await
    }

    /// Adopt-and-restart shrink loop: any candidate that still fails with
    /// the same error kind becomes the new minimum; stop at a fixed point
    /// or when the iteration budget runs out.
    async fn shrink_failure(
        &self,
        draw: &RouteDraw,
        mut tree: smolder_gen::DrawTree,
        mut values: RouteValues,
        mut outcome: ExecOutcome,
        kind: FailureKind,
        trial_index: u32,
    ) -> FailureReport {
        let mut iters = 0u32;
        'restart: loop {
            let candidates: Vec<_> = shrink::candidates(&tree).collect();
            for candidate in candidates {
                if iters >= self.settings.max_shrink_iters {
                    break 'restart;
                }
                iters += 1;
                let Ok(candidate_values) = draw.replay(&candidate) else { continue };
                let Ok(candidate_outcome) = self.execute(&candidate_values).await else {
                    continue;
                };
                if candidate_outcome.failure_kind() == Some(kind) {
                    tree = candidate;
                    values = candidate_values;
                    outcome = candidate_outcome;
                    continue 'restart;
                }
            }
            break;
        }

        FailureReport {
            operation: self.route.operation_id(&self.method),
            kind,
            errors: outcome.verdict.errors.clone(),
            values: values.to_json(),
            request: RenderedRequest::from_plan(&outcome.plan),
            response: outcome.response.as_ref().map(RenderedResponse::from_response),
            seed: self.settings.seed,
            trial_index,
            draw_tree: self.settings.keep_draw_trees.then_some(tree),
            steps: Vec::new(),
        }
    }
}

/// Run orchestrator: filter, auth resolution, one `TrialRunner` per
/// selected (route, method), sequentially, aggregated into a `RunReport`.
pub struct Engine {
    transport: Arc<dyn Transport>,
    registry: TypeRegistry,
    validator: Arc<dyn Validator>,
    auth: AuthTable,
    settings: RunSettings,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: TypeRegistry::new(),
            validator: Arc::new(StatusValidator::fail_on_5xx()),
            auth: AuthTable::none(),
            settings: RunSettings::default(),
        }
    }

    /// The registry used for the run; mutate it during setup.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_auth(mut self, auth: AuthTable) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn run(&self, routes: &[RouteSpec], filter: &RouteFilter) -> RunReport {
        let started = Instant::now();
        let selected = filter.apply(routes);
        if selected.is_empty() {
            tracing::warn!("filter selected no applicable routes");
            return RunReport::new(Vec::new(), started.elapsed());
        }

        let registry = self.registry.snapshot();
        let mut reports = Vec::new();
        let mut lane = 0u64;
        for route in selected {
            for method in filter.selected_methods(route) {
                let runner = TrialRunner {
                    route,
                    method,
                    registry: registry.clone(),
                    validator: self.validator.clone(),
                    auth: self.auth.for_path(route.path()).clone(),
                    transport: self.transport.as_ref(),
                    settings: self.settings.clone(),
                    route_index: lane,
                };
                reports.push(runner.run().await);
                lane += 1;
            }
        }
        RunReport::new(reports, started.elapsed())
    }
}
