//! Bundle-tracking sequence generation and per-sequence shrinking.
//!
//! One rule per (method, path) operation. A rule fires only when every
//! bundle it consumes is non-empty; fired rules draw their remaining
//! parameters through the ordinary generator machinery. Bundles live for
//! exactly one sequence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use serde_json::Value;

use smolder_core::{GenValue, RouteSpec};
use smolder_gen::{child_seed, rng_for, shrink, DrawCtx, DrawTree, NodeKind, RegistrySnapshot};

use crate::auth::{AuthDecorator, AuthTable};
use crate::draw::{RouteDraw, RouteValues};
use crate::exec::{execute, ExecOutcome};
use crate::report::{
    Coverage, FailureReport, RenderedRequest, RenderedResponse, StatefulReport, StepReport,
};
use crate::settings::StatefulSettings;
use crate::stateful::links::{ExtractExpr, LinkGraph, OpId, ParamSlot};
use crate::transport::Transport;
use crate::validate::{FailureKind, Validator};

/// A value sitting in a bundle, with its chain depth for the recursion
/// guard.
#[derive(Debug, Clone)]
struct BundleEntry {
    value: Value,
    depth: usize,
}

type Bundles = HashMap<String, Vec<BundleEntry>>;

/// One consumption edge of a rule.
struct ConsumeEdge {
    bundle: String,
    slot: ParamSlot,
    label: String,
}

/// One production edge of a rule.
struct ProduceEdge {
    expr: ExtractExpr,
    bundle: String,
}

/// A state-machine rule: one operation plus its declared bundle traffic.
struct Rule {
    op: OpId,
    route_index: usize,
    auth: AuthDecorator,
    consumes: Vec<ConsumeEdge>,
    produces: Vec<ProduceEdge>,
    draw: RouteDraw,
}

/// One executed (or replayed) step.
#[derive(Clone)]
struct StepRecord {
    rule_index: usize,
    /// `[picks, params]`: bundle-entry choices, then the parameter draws.
    tree: DrawTree,
}

/// The observable result of applying one step.
struct StepApplied {
    outcome: ExecOutcome,
    values: RouteValues,
}

enum SequenceResult {
    Clean { executed: u64 },
    TimedOut { executed: u64 },
    Failed { steps: Vec<StepRecord>, applied: Vec<StepApplied>, kind: FailureKind, executed: u64 },
}

/// Generates sequences of up to `step_count` calls against a route set,
/// maintaining bundles of produced identifiers, and shrinks any failing
/// sequence to a minimal prefix.
pub struct StateMachineRunner<'a> {
    pub routes: &'a [RouteSpec],
    pub graph: &'a LinkGraph,
    pub registry: RegistrySnapshot,
    pub validator: Arc<dyn Validator>,
    pub auth: AuthTable,
    pub transport: &'a dyn Transport,
    pub settings: StatefulSettings,
}

impl StateMachineRunner<'_> {
    pub async fn run(&self) -> StatefulReport {
        let started = Instant::now();
        let deadline = started + self.settings.total_timeout;

        let rules = match self.build_rules() {
            Ok(rules) => rules,
            Err(err) => {
                return StatefulReport {
                    sequences: 0,
                    steps_executed: 0,
                    failure: None,
                    coverage: Coverage::default(),
                    timed_out: false,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    fatal: Some(err.to_string()),
                };
            }
        };

        let mut coverage = Coverage::default();
        let mut executed = 0u64;
        let mut sequences = 0u32;
        let mut timed_out = false;
        let mut failure = None;

        for seq in 0..self.settings.max_sequences {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            sequences += 1;
            match self.run_sequence(&rules, seq, &mut coverage, deadline).await {
                SequenceResult::Clean { executed: n } => executed += n,
                SequenceResult::TimedOut { executed: n } => {
                    executed += n;
                    timed_out = true;
                    break;
                }
                SequenceResult::Failed { steps, applied, kind, executed: n } => {
                    executed += n;
                    tracing::debug!(
                        sequence = seq,
                        steps = steps.len(),
                        kind = %kind,
                        "failing sequence found, shrinking"
                    );
                    failure =
                        Some(self.shrink_sequence(&rules, steps, applied, kind).await);
                    break;
                }
            }
        }

        StatefulReport {
            sequences,
            steps_executed: executed,
            failure,
            coverage,
            timed_out,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fatal: None,
        }
    }

    fn build_rules(&self) -> Result<Vec<Rule>, crate::EngineError> {
        let mut rules = Vec::new();
        for (route_index, route) in self.routes.iter().enumerate() {
            for method in route.methods() {
                let op = OpId::of(route, method);
                let mut consumes: Vec<ConsumeEdge> = Vec::new();
                let mut produces: Vec<ProduceEdge> = Vec::new();
                for link in self.graph.links() {
                    if link.consumer == op
                        && !consumes.iter().any(|edge| edge.slot == link.param)
                    {
                        consumes.push(ConsumeEdge {
                            bundle: link.bundle.clone(),
                            slot: link.param.clone(),
                            label: link.label(),
                        });
                    }
                    if link.producer == op
                        && !produces
                            .iter()
                            .any(|edge| edge.bundle == link.bundle && edge.expr == link.expr)
                    {
                        produces.push(ProduceEdge {
                            expr: link.expr.clone(),
                            bundle: link.bundle.clone(),
                        });
                    }
                }

                let mut skip_path = Vec::new();
                let mut skip_query = Vec::new();
                let mut skip_header = Vec::new();
                for edge in &consumes {
                    match &edge.slot {
                        ParamSlot::Path(name) => skip_path.push(name.clone()),
                        ParamSlot::Query(name) => skip_query.push(name.clone()),
                        ParamSlot::Header(name) => skip_header.push(name.clone()),
                        ParamSlot::BodyField(_) => {}
                    }
                }
                let draw = RouteDraw::resolve_excluding(
                    route,
                    &self.registry,
                    &skip_path,
                    &skip_query,
                    &skip_header,
                )?;
                let auth = self.auth.for_path(route.path()).clone();
                auth.preflight()?;
                rules.push(Rule { op, route_index, auth, consumes, produces, draw });
            }
        }
        Ok(rules)
    }

    /// Entry indices of a bundle that the recursion guard still admits.
    fn eligible_entries(&self, bundles: &Bundles, bundle: &str) -> Vec<usize> {
        bundles
            .get(bundle)
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.depth < self.settings.recursion_limit)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rule_is_eligible(&self, rule: &Rule, bundles: &Bundles) -> bool {
        rule.consumes
            .iter()
            .all(|edge| !self.eligible_entries(bundles, &edge.bundle).is_empty())
    }

    async fn run_sequence(
        &self,
        rules: &[Rule],
        seq: u32,
        coverage: &mut Coverage,
        deadline: Instant,
    ) -> SequenceResult {
        let mut bundles: Bundles = HashMap::new();
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut applied_log: Vec<StepApplied> = Vec::new();
        let mut executed = 0u64;
        let mut consecutive_timeouts = 0u32;
        let mut first_failure: Option<(usize, FailureKind)> = None;

        for step_index in 0..self.settings.step_count {
            if Instant::now() >= deadline {
                return SequenceResult::TimedOut { executed };
            }

            let seed = child_seed(self.settings.seed, u64::from(seq), step_index as u64);
            let mut rng = rng_for(seed);

            let eligible: Vec<usize> = rules
                .iter()
                .enumerate()
                .filter(|(_, rule)| self.rule_is_eligible(rule, &bundles))
                .map(|(i, _)| i)
                .collect();
            if eligible.is_empty() {
                break;
            }
            let rule_index = eligible[rng.gen_range(0..eligible.len())];
            let rule = &rules[rule_index];

            let mut picks = Vec::with_capacity(rule.consumes.len());
            for edge in &rule.consumes {
                let candidates = self.eligible_entries(&bundles, &edge.bundle);
                let choice = rng.gen_range(0..candidates.len());
                picks.push(DrawTree::Choice { index: choice, arity: candidates.len() });
            }

            let mut ctx =
                DrawCtx::new(&mut rng, self.settings.size, self.registry.max_ref_depth());
            let (_, params_tree) = rule.draw.draw(&mut ctx);
            let record = StepRecord {
                rule_index,
                tree: DrawTree::node(
                    NodeKind::Record,
                    vec![DrawTree::node(NodeKind::Record, picks), params_tree],
                ),
            };

            let Some(applied) = self.apply_step(rules, &record, &mut bundles).await else {
                // A freshly-drawn step can only fail to apply if a value was
                // unencodable; skip it.
                continue;
            };
            executed += 1;
            *coverage.operations.entry(rule.op.to_string()).or_insert(0) += 1;
            for edge in &rule.consumes {
                *coverage.links.entry(edge.label.clone()).or_insert(0) += 1;
            }

            let failure_kind = applied.outcome.failure_kind();
            let timed_out_step = applied.outcome.timed_out();
            steps.push(record);
            applied_log.push(applied);

            match failure_kind {
                None => consecutive_timeouts = 0,
                Some(kind) => {
                    if first_failure.is_none() {
                        first_failure = Some((steps.len() - 1, kind));
                    }
                    if self.settings.fail_fast {
                        break;
                    }
                    if timed_out_step {
                        consecutive_timeouts += 1;
                        if consecutive_timeouts >= 2 {
                            break;
                        }
                    } else {
                        consecutive_timeouts = 0;
                    }
                }
            }
        }

        match first_failure {
            Some((index, kind)) => {
                steps.truncate(index + 1);
                applied_log.truncate(index + 1);
                SequenceResult::Failed { steps, applied: applied_log, kind, executed }
            }
            None => SequenceResult::Clean { executed },
        }
    }

    /// Replay one step against the current bundles: resolve its bundle
    /// picks, replay its parameter draws, merge, execute, and on success
    /// append what it produces.
    ///
    /// `None` means the step no longer fits (an edited pick out of range, a
    /// params tree the generators reject, an unencodable value); shrink
    /// candidates that hit this are discarded.
    async fn apply_step(
        &self,
        rules: &[Rule],
        record: &StepRecord,
        bundles: &mut Bundles,
    ) -> Option<StepApplied> {
        let rule = &rules[record.rule_index];
        let route = &self.routes[rule.route_index];

        let DrawTree::Node { kind: NodeKind::Record, children } = &record.tree else {
            return None;
        };
        let [picks_node, params_tree] = children.as_slice() else {
            return None;
        };
        let DrawTree::Node { kind: NodeKind::Record, children: picks } = picks_node else {
            return None;
        };
        if picks.len() != rule.consumes.len() {
            return None;
        }

        let mut consumed: Vec<(&ParamSlot, Value, usize)> =
            Vec::with_capacity(rule.consumes.len());
        for (edge, pick) in rule.consumes.iter().zip(picks) {
            let DrawTree::Choice { index, .. } = pick else { return None };
            let candidates = self.eligible_entries(bundles, &edge.bundle);
            let entry_index = *candidates.get(*index)?;
            let entry = &bundles[&edge.bundle][entry_index];
            consumed.push((&edge.slot, entry.value.clone(), entry.depth));
        }

        let mut values = rule.draw.replay(params_tree).ok()?;
        for (slot, value, _) in &consumed {
            let lifted = GenValue::from_json(value);
            match slot {
                ParamSlot::Path(name) => values.path.push((name.clone(), lifted)),
                ParamSlot::Query(name) => values.query.push((name.clone(), lifted)),
                ParamSlot::Header(name) => values.header.push((name.clone(), lifted)),
                ParamSlot::BodyField(name) => match &mut values.body {
                    Some(GenValue::Record(fields)) => {
                        if let Some(slot) = fields.iter_mut().find(|(n, _)| n == name) {
                            slot.1 = lifted;
                        } else {
                            fields.push((name.clone(), lifted));
                        }
                    }
                    _ => {
                        tracing::debug!(
                            field = %name,
                            "linked body field has no record body to land in"
                        );
                    }
                },
            }
        }

        let outcome = execute(
            self.transport,
            route,
            &rule.op.method,
            &values,
            &rule.auth,
            self.validator.as_ref(),
            self.settings.per_step_timeout,
        )
        .await
        .ok()?;

        if outcome.verdict.valid {
            let produced_depth =
                1 + consumed.iter().map(|(_, _, depth)| *depth).max().unwrap_or(0);
            if produced_depth <= self.settings.recursion_limit {
                if let Some(response) = &outcome.response {
                    for edge in &rule.produces {
                        match edge.expr.extract(response) {
                            Some(value) => bundles
                                .entry(edge.bundle.clone())
                                .or_default()
                                .push(BundleEntry { value, depth: produced_depth }),
                            None => tracing::debug!(
                                bundle = %edge.bundle,
                                op = %rule.op,
                                "link extraction produced nothing"
                            ),
                        }
                    }
                }
            }
        }

        Some(StepApplied { outcome, values })
    }

    /// Replay a whole candidate sequence from fresh bundles. `None` when
    /// any step fails to apply or a non-final step now fails outright.
    async fn replay_sequence(
        &self,
        rules: &[Rule],
        steps: &[StepRecord],
    ) -> Option<Vec<StepApplied>> {
        let mut bundles: Bundles = HashMap::new();
        let mut applied_log = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let applied = self.apply_step(rules, step, &mut bundles).await?;
            if i + 1 != steps.len() && applied.outcome.failure_kind().is_some() {
                return None;
            }
            applied_log.push(applied);
        }
        Some(applied_log)
    }

    /// Two-granularity shrink: drop steps that are not needed to reach the
    /// failure, then shrink the parameter draws of each retained step.
    async fn shrink_sequence(
        &self,
        rules: &[Rule],
        mut steps: Vec<StepRecord>,
        mut applied: Vec<StepApplied>,
        kind: FailureKind,
    ) -> FailureReport {
        let mut iters = 0u32;
        'restart: loop {
            for j in (0..steps.len().saturating_sub(1)).rev() {
                if iters >= self.settings.max_shrink_iters {
                    break 'restart;
                }
                iters += 1;
                let mut candidate = steps.clone();
                candidate.remove(j);
                if let Some(replayed) = self.replay_sequence(rules, &candidate).await {
                    if replayed.last().and_then(|a| a.outcome.failure_kind()) == Some(kind) {
                        steps = candidate;
                        applied = replayed;
                        continue 'restart;
                    }
                }
            }
            for k in 0..steps.len() {
                let tree_candidates: Vec<_> = shrink::candidates(&steps[k].tree).collect();
                for tree_candidate in tree_candidates {
                    if iters >= self.settings.max_shrink_iters {
                        break 'restart;
                    }
                    iters += 1;
                    let mut candidate = steps.clone();
                    candidate[k].tree = tree_candidate;
                    if let Some(replayed) = self.replay_sequence(rules, &candidate).await {
                        if replayed.last().and_then(|a| a.outcome.failure_kind())
                            == Some(kind)
                        {
                            steps = candidate;
                            applied = replayed;
                            continue 'restart;
                        }
                    }
                }
            }
            break;
        }

        let last_index = steps.len() - 1;
        let last = &applied[last_index];
        let prior_steps = steps[..last_index]
            .iter()
            .zip(&applied[..last_index])
            .map(|(step, applied)| StepReport {
                operation: rules[step.rule_index].op.to_string(),
                request: RenderedRequest::from_plan(&applied.outcome.plan),
                status: applied.outcome.response.as_ref().map(|r| r.status.as_u16()),
            })
            .collect();

        FailureReport {
            operation: rules[steps[last_index].rule_index].op.to_string(),
            kind,
            errors: last.outcome.verdict.errors.clone(),
            values: last.values.to_json(),
            request: RenderedRequest::from_plan(&last.outcome.plan),
            response: last.outcome.response.as_ref().map(RenderedResponse::from_response),
            seed: self.settings.seed,
            trial_index: last_index as u32,
            draw_tree: self
                .settings
                .keep_draw_trees
                .then(|| steps[last_index].tree.clone()),
            steps: prior_steps,
        }
    }
}
