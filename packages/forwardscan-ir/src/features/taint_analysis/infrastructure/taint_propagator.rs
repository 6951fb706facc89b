/*
 * Taint Propagator
 *
 * Forward worklist over one FlowGraph, run once per SOURCE node:
 * - seed TAINTED/RAW at the source, every other node starts CLEAN
 * - node output = transfer(kind, join(taint-carrying predecessors))
 * - GUARD nodes apply the branch's atoms and consult the BarrierEvaluator;
 *   EFFECTIVE makes that refinement CLEAN
 *
 * Convergence:
 *   potential = Σ (max_badness - badness(node))
 * Every update must move a node up the lattice and strictly lower the
 * potential. A violation, the visit ceiling or the time budget makes the
 * procedure UNSTABLE; every source-reachable sink is then FLAGGED.
 */

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::barrier_evaluator::{apply_atoms, BarrierEvaluator};
use super::flow_graph_builder::FlowGraph;
use crate::features::taint_analysis::domain::{
    AppliedBarrier, BarrierEvaluation, DecodeLevel, Finding, NodeKind, PathStep, SanitizerKind,
    TaintValue, UnstableReason, Verdict,
};

/// Timeout is sampled every this many visits
const CLOCK_SAMPLE: usize = 64;

// ============================================================================
// Options / outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationLimits {
    /// Node visits per procedure, summed over sources
    pub max_iterations: usize,
    /// Per-procedure time budget; `None` = unlimited
    pub timeout: Option<Duration>,
    /// Longest reconstructed path (source and sink included)
    pub max_path_len: usize,
    /// Emit SUPPRESSED_BY_BARRIER findings
    pub explain_suppressed: bool,
}

impl Default for PropagationLimits {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            timeout: None,
            max_path_len: 64,
            explain_suppressed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationStatus {
    Complete,
    Unstable(UnstableReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationStats {
    pub sources: usize,
    pub visits: usize,
    pub updates: usize,
    pub guard_evaluations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOutcome {
    pub findings: Vec<Finding>,
    pub status: PropagationStatus,
    pub stats: PropagationStats,
}

impl PropagationOutcome {
    pub fn is_unstable(&self) -> bool {
        matches!(self.status, PropagationStatus::Unstable(_))
    }
}

// ============================================================================
// Per-source state
// ============================================================================

/// Fixed point of one source
struct SourceRun {
    seed: NodeIndex,
    values: Vec<TaintValue>,
    evaluations: FxHashMap<NodeIndex, BarrierEvaluation>,
}

struct Budget {
    started: Instant,
    visits: usize,
}

// ============================================================================
// Propagator
// ============================================================================

pub struct TaintPropagator<'a> {
    evaluator: &'a BarrierEvaluator,
    limits: PropagationLimits,
}

impl<'a> TaintPropagator<'a> {
    pub fn new(evaluator: &'a BarrierEvaluator, limits: PropagationLimits) -> Self {
        Self { evaluator, limits }
    }

    pub fn propagate(&self, graph: &FlowGraph) -> PropagationOutcome {
        let mut stats = PropagationStats {
            sources: graph.sources.len(),
            ..Default::default()
        };
        let mut budget = Budget {
            started: Instant::now(),
            visits: 0,
        };

        let mut runs = Vec::with_capacity(graph.sources.len());
        for &seed in &graph.sources {
            match self.run_source(graph, seed, &mut budget, &mut stats) {
                Ok(run) => runs.push(run),
                Err(reason) => {
                    debug!(
                        procedure = %graph.procedure,
                        reason = %reason,
                        "propagation unstable, falling back to reachability"
                    );
                    stats.visits = budget.visits;
                    return PropagationOutcome {
                        findings: self.fallback_findings(graph),
                        status: PropagationStatus::Unstable(reason),
                        stats,
                    };
                }
            }
        }
        stats.visits = budget.visits;

        let mut findings: Vec<Finding> = runs
            .iter()
            .flat_map(|run| self.findings_for(graph, run))
            .collect();
        findings.sort_by_key(|f| f.sort_key());

        trace!(
            procedure = %graph.procedure,
            visits = stats.visits,
            findings = findings.len(),
            "propagation complete"
        );

        PropagationOutcome {
            findings,
            status: PropagationStatus::Complete,
            stats,
        }
    }

    fn run_source(
        &self,
        graph: &FlowGraph,
        seed: NodeIndex,
        budget: &mut Budget,
        stats: &mut PropagationStats,
    ) -> Result<SourceRun, UnstableReason> {
        let n = graph.node_count();
        let universe = graph.atom_count();
        let ceiling = u64::from(TaintValue::max_badness(universe));

        let mut run = SourceRun {
            seed,
            values: vec![TaintValue::clean(); n],
            evaluations: FxHashMap::default(),
        };
        let mut potential = ceiling * n as u64;

        let mut worklist: VecDeque<NodeIndex> = graph.graph.node_indices().collect();
        let mut queued = vec![true; n];

        while let Some(node) = worklist.pop_front() {
            queued[node.index()] = false;
            budget.visits += 1;
            if budget.visits > self.limits.max_iterations {
                return Err(UnstableReason::IterationLimit {
                    visits: budget.visits - 1,
                });
            }
            if let Some(timeout) = self.limits.timeout {
                if budget.visits % CLOCK_SAMPLE == 0 && budget.started.elapsed() > timeout {
                    return Err(UnstableReason::Timeout {
                        elapsed_ms: budget.started.elapsed().as_millis() as u64,
                    });
                }
            }

            let new = self.transfer(graph, &mut run, node, stats);
            let old = &run.values[node.index()];
            if &new == old {
                continue;
            }

            let old_badness = old.badness(universe);
            let new_badness = new.badness(universe);
            if !old.leq(&new) || new_badness <= old_badness {
                return Err(UnstableReason::NonMonotone { node: node.index() });
            }
            potential = potential.saturating_sub(u64::from(new_badness - old_badness));
            run.values[node.index()] = new;
            stats.updates += 1;

            for e in graph.graph.edges_directed(node, Direction::Outgoing) {
                let succ = e.target();
                if e.weight().carries_taint() && !queued[succ.index()] {
                    queued[succ.index()] = true;
                    worklist.push_back(succ);
                }
            }
        }

        trace!(
            procedure = %graph.procedure,
            seed = seed.index(),
            potential,
            "source fixed point"
        );
        Ok(run)
    }

    fn input(&self, graph: &FlowGraph, values: &[TaintValue], node: NodeIndex) -> TaintValue {
        graph
            .taint_preds(node)
            .fold(TaintValue::clean(), |acc, p| acc.join(&values[p.index()]))
    }

    fn transfer(
        &self,
        graph: &FlowGraph,
        run: &mut SourceRun,
        node: NodeIndex,
        stats: &mut PropagationStats,
    ) -> TaintValue {
        let flow_node = graph.node(node);
        match &flow_node.kind {
            NodeKind::SourceCall => {
                if node == run.seed {
                    TaintValue::tainted()
                } else {
                    TaintValue::clean()
                }
            }
            NodeKind::Literal => TaintValue::clean(),
            NodeKind::VariableRef => {
                if graph.taint_preds(node).next().is_none() {
                    TaintValue::unknown()
                } else {
                    self.input(graph, &run.values, node)
                }
            }
            NodeKind::Phi => self.input(graph, &run.values, node),
            NodeKind::Concat => {
                let mut v = self.input(graph, &run.values, node);
                v.checks.clear();
                v.ops.normalized = false;
                v.canonical_form()
            }
            NodeKind::Call | NodeKind::SinkCall { .. } => {
                let mut v = self.input(graph, &run.values, node);
                v.checks.clear();
                v.ops.normalized = false;
                v.ops.case_folded = false;
                v.canonical_form()
            }
            NodeKind::SanitizerCall { sanitizer } => {
                let mut v = self.input(graph, &run.values, node);
                if v.is_clean() {
                    return TaintValue::clean();
                }
                match sanitizer {
                    SanitizerKind::Decode => {
                        if v.ops.decode == DecodeLevel::Raw {
                            v.ops.decode = DecodeLevel::Once;
                        }
                        v.checks.clear();
                        v.ops.normalized = false;
                        v.ops.case_folded = false;
                        v.ops.encoding_seen = false;
                    }
                    SanitizerKind::Normalize => {
                        if v.ops.decode == DecodeLevel::Canonical {
                            v.ops.normalized = true;
                        } else {
                            v.ops.normalized_before_decode = true;
                        }
                    }
                    SanitizerKind::CaseFold => v.ops.case_folded = true,
                }
                v
            }
            NodeKind::Guard { guard, branch } => {
                let input = self.input(graph, &run.values, node);
                if input.is_clean() {
                    return TaintValue::clean();
                }
                let (Some(condition), Some(subject)) = (graph.guard(*guard), flow_node.var.as_deref())
                else {
                    return input;
                };
                let atoms: Vec<_> = condition.atoms_for(subject, *branch).cloned().collect();
                let refined = apply_atoms(&input, &atoms);
                let evaluation = self
                    .evaluator
                    .evaluate(condition, *branch, subject, &atoms, &refined);
                stats.guard_evaluations += 1;

                let effective = evaluation.verdict.is_effective();
                run.evaluations.insert(node, evaluation);
                if effective {
                    TaintValue::clean()
                } else {
                    refined
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Findings
    // ------------------------------------------------------------------------

    fn findings_for(&self, graph: &FlowGraph, run: &SourceRun) -> Vec<Finding> {
        let reachable = graph.reachable_from(run.seed);
        let mut out = Vec::new();

        for &sink in &graph.sinks {
            let args = graph.sink_args(sink);
            if args.is_empty() || !args.iter().any(|a| reachable[a.index()]) {
                continue;
            }
            let arg_value = args
                .iter()
                .fold(TaintValue::clean(), |acc, a| acc.join(&run.values[a.index()]));

            if arg_value.is_tainted() {
                let path = self.path(graph, run.seed, sink, |n| {
                    n == sink || !run.values[n.index()].is_clean()
                });
                out.push(self.finding(graph, run.seed, sink, path, Verdict::Flagged, Vec::new(), false));
            } else if self.limits.explain_suppressed {
                let barriers = self.barriers(graph, run, &reachable, &args);
                let path = self.path(graph, run.seed, sink, |n| reachable[n.index()]);
                out.push(self.finding(
                    graph,
                    run.seed,
                    sink,
                    path,
                    Verdict::SuppressedByBarrier,
                    barriers,
                    false,
                ));
            }
        }
        out
    }

    /// Effective guard refinements between the source and the sink arguments
    fn barriers(
        &self,
        graph: &FlowGraph,
        run: &SourceRun,
        reachable: &[bool],
        args: &[NodeIndex],
    ) -> Vec<AppliedBarrier> {
        let co_reachable = graph.co_reachable(args);
        let mut nodes: Vec<&NodeIndex> = run
            .evaluations
            .iter()
            .filter(|(n, e)| {
                e.verdict.is_effective() && reachable[n.index()] && co_reachable[n.index()]
            })
            .map(|(n, _)| n)
            .collect();
        nodes.sort();

        let mut out: Vec<AppliedBarrier> = Vec::new();
        for &node in nodes {
            let flow_node = graph.node(node);
            let (Some((guard, branch)), Some(evaluation)) =
                (flow_node.guard(), run.evaluations.get(&node))
            else {
                continue;
            };
            let Some(condition) = graph.guard(guard) else {
                continue;
            };
            let variable = flow_node.var.clone().unwrap_or_default();
            if out
                .iter()
                .any(|b| b.guard == guard && b.branch == branch && b.variable == variable)
            {
                continue;
            }
            out.push(AppliedBarrier {
                guard,
                branch,
                guard_text: condition.text.clone(),
                span: condition.span,
                variable,
                evaluation: evaluation.clone(),
            });
        }
        out
    }

    /// Conservative result of an unstable procedure
    fn fallback_findings(&self, graph: &FlowGraph) -> Vec<Finding> {
        let mut out = Vec::new();
        for &seed in &graph.sources {
            let reachable = graph.reachable_from(seed);
            for &sink in &graph.sinks {
                let args = graph.sink_args(sink);
                if !args.iter().any(|a| reachable[a.index()]) {
                    continue;
                }
                let path = self.path(graph, seed, sink, |n| reachable[n.index()]);
                out.push(self.finding(graph, seed, sink, path, Verdict::Flagged, Vec::new(), true));
            }
        }
        out.sort_by_key(|f| f.sort_key());
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn finding(
        &self,
        graph: &FlowGraph,
        source: NodeIndex,
        sink: NodeIndex,
        path: Vec<PathStep>,
        verdict: Verdict,
        barriers: Vec<AppliedBarrier>,
        unstable: bool,
    ) -> Finding {
        Finding {
            procedure: graph.procedure.clone(),
            source: step(graph, source),
            sink: step(graph, sink),
            path,
            verdict,
            barriers,
            unstable,
        }
    }

    /// Shortest taint-carrying path from `from` to `to` through admitted nodes
    fn path(
        &self,
        graph: &FlowGraph,
        from: NodeIndex,
        to: NodeIndex,
        admit: impl Fn(NodeIndex) -> bool,
    ) -> Vec<PathStep> {
        let mut parent: FxHashMap<NodeIndex, NodeIndex> = FxHashMap::default();
        let mut seen: FxHashSet<NodeIndex> = FxHashSet::default();
        let mut queue = VecDeque::from([from]);
        seen.insert(from);

        while let Some(n) = queue.pop_front() {
            if n == to {
                break;
            }
            for e in graph.graph.edges_directed(n, Direction::Outgoing) {
                let next = e.target();
                if e.weight().carries_taint() && admit(next) && seen.insert(next) {
                    parent.insert(next, n);
                    queue.push_back(next);
                }
            }
        }

        let mut nodes = vec![to];
        let mut cursor = to;
        while let Some(&p) = parent.get(&cursor) {
            nodes.push(p);
            cursor = p;
        }
        if cursor != from {
            nodes.push(from);
        }
        nodes.reverse();

        let limit = self.limits.max_path_len.max(2);
        if nodes.len() > limit {
            let last = nodes[nodes.len() - 1];
            nodes.truncate(limit - 1);
            nodes.push(last);
        }
        nodes.into_iter().map(|n| step(graph, n)).collect()
    }
}

fn step(graph: &FlowGraph, idx: NodeIndex) -> PathStep {
    let node = graph.node(idx);
    PathStep {
        node: idx.index(),
        kind: node.kind.label().to_string(),
        text: node.text.clone(),
        span: node.span,
    }
}
