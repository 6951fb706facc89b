/*
 * Taint Analysis Application Layer
 *
 * Use cases and orchestration logic following Clean Architecture principles.
 *
 * Architecture:
 * ```
 * +------------------+     +-------------------+     +-------------------+
 * |   Input Port     | --> |    Use Case       | --> |  Infrastructure   |
 * | (Service Trait)  |     | (orchestration)   |     | (graph, taint)    |
 * +------------------+     +-------------------+     +-------------------+
 *        ^                         |
 *        |                         v
 *   Adapters                 Domain Models
 *   (CLI, tests)           (Finding, etc.)
 * ```
 *
 * Per procedure: build flow graph -> propagate -> report.
 * Procedures are independent and run on the rayon pool when enabled.
 * A failing procedure is reported FAILED; its siblings still run.
 * Overloads are told apart by signature; a repeated signature is FAILED.
 */

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::domain::{Finding, UnstableReason};
use super::infrastructure::{
    BarrierEvaluator, FlowGraphBuilder, PropagationStatus, ResultReporter, SignatureCatalog,
    TaintPropagator,
};
use super::ports::{
    AnalysisReport, AnalysisStats, ProcedureReport, ProcedureStatus, TaintAnalysisError,
    TaintResult, UrlForwardAnalysisService,
};
use crate::config::TaintConfig;
use crate::features::procedure_ir::{CompilationUnit, Procedure};

// ============================================================================
// Main Use Case: Analyze URL forwards
// ============================================================================

/// Per-procedure result before aggregation
struct ProcedureRun {
    report: ProcedureReport,
    findings: Vec<Finding>,
    edges: usize,
    visits: usize,
    guard_evaluations: usize,
}

/// Main URL-forward analysis use case
pub struct AnalyzeUrlForwardUseCase {
    catalog: Arc<SignatureCatalog>,
    config: TaintConfig,
    evaluator: BarrierEvaluator,
    reporter: ResultReporter,
}

impl AnalyzeUrlForwardUseCase {
    /// Create new use case; the configuration is validated here
    pub fn new(catalog: Arc<SignatureCatalog>, config: TaintConfig) -> TaintResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            evaluator: BarrierEvaluator::new(config.barrier_options()),
            reporter: ResultReporter::new(config.explain_suppressed),
            config,
        })
    }

    /// Use case over the built-in catalog
    pub fn with_default_catalog(config: TaintConfig) -> TaintResult<Self> {
        let catalog = SignatureCatalog::url_forward_default()?;
        Self::new(Arc::new(catalog), config)
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn reporter(&self) -> &ResultReporter {
        &self.reporter
    }

    /// Execute analysis
    pub fn execute(&self, unit: &CompilationUnit) -> TaintResult<AnalysisReport> {
        let start = Instant::now();
        let duplicates = duplicate_signatures(unit);
        let run = |(index, procedure): (usize, &Procedure)| match duplicates.get(&index) {
            Some(first) => self.duplicate_run(unit, procedure, *first),
            None => self.run_procedure(unit, procedure),
        };

        let runs: Vec<ProcedureRun> = if self.config.parallel {
            unit.procedures.par_iter().enumerate().map(run).collect()
        } else {
            unit.procedures.iter().enumerate().map(run).collect()
        };

        let mut stats = AnalysisStats {
            procedures_analyzed: runs.len(),
            ..Default::default()
        };
        let mut findings = Vec::new();
        let mut procedures = Vec::with_capacity(runs.len());

        for run in runs {
            match &run.report.status {
                ProcedureStatus::Complete => {}
                ProcedureStatus::Unstable { .. } => stats.procedures_unstable += 1,
                ProcedureStatus::Failed { .. } => stats.procedures_failed += 1,
            }
            stats.nodes_analyzed += run.report.nodes;
            stats.edges_analyzed += run.edges;
            stats.node_visits += run.visits;
            stats.guard_evaluations += run.guard_evaluations;
            for f in &run.findings {
                if f.is_flagged() {
                    stats.findings_flagged += 1;
                } else {
                    stats.findings_suppressed += 1;
                }
            }
            findings.extend(self.reporter.finding_dtos(&run.findings));
            procedures.push(run.report);
        }
        stats.analysis_time_ms = start.elapsed().as_millis() as u64;

        info!(
            unit = %unit.name,
            procedures = stats.procedures_analyzed,
            flagged = stats.findings_flagged,
            suppressed = stats.findings_suppressed,
            unstable = stats.procedures_unstable,
            failed = stats.procedures_failed,
            elapsed_ms = stats.analysis_time_ms,
            "URL-forward analysis complete"
        );

        Ok(AnalysisReport {
            unit: unit.name.clone(),
            findings,
            procedures,
            stats,
        })
    }

    fn run_procedure(&self, unit: &CompilationUnit, procedure: &Procedure) -> ProcedureRun {
        let graph = match FlowGraphBuilder::new(&self.catalog, &unit.constants).build(procedure) {
            Ok(graph) => graph,
            Err(err) => {
                let err = TaintAnalysisError::from(err).with_context(procedure.signature());
                warn!(procedure = %procedure.name, error = %err, "flow graph construction failed");
                return failed_run(procedure, err);
            }
        };

        let propagator = TaintPropagator::new(&self.evaluator, self.config.propagation_limits());
        let outcome = propagator.propagate(&graph);

        let status = match &outcome.status {
            PropagationStatus::Complete => ProcedureStatus::Complete,
            PropagationStatus::Unstable(reason) => {
                let err = unstable_error(reason).with_context(procedure.signature());
                warn!(
                    procedure = %procedure.name,
                    kind = ?err.kind,
                    reason = %reason,
                    "procedure unstable, reporting reachable sinks as flagged"
                );
                ProcedureStatus::Unstable {
                    reason: err.message,
                }
            }
        };

        debug!(
            procedure = %procedure.name,
            sources = outcome.stats.sources,
            visits = outcome.stats.visits,
            findings = outcome.findings.len(),
            "procedure analyzed"
        );

        ProcedureRun {
            report: ProcedureReport {
                name: procedure.name.clone(),
                signature: procedure.signature(),
                status,
                findings: self.reporter.finding_dtos(&outcome.findings),
                nodes: graph.node_count(),
                guards: graph.guards.len(),
            },
            edges: graph.edge_count(),
            visits: outcome.stats.visits,
            guard_evaluations: outcome.stats.guard_evaluations,
            findings: outcome.findings,
        }
    }

    fn duplicate_run(&self, unit: &CompilationUnit, procedure: &Procedure, first: usize) -> ProcedureRun {
        let err = TaintAnalysisError::invalid_input(format!(
            "'{}' is already declared as procedure #{}",
            procedure.signature(),
            first
        ))
        .with_context(unit.name.clone());
        warn!(procedure = %procedure.name, error = %err, "duplicate procedure signature");
        failed_run(procedure, err)
    }
}

impl UrlForwardAnalysisService for AnalyzeUrlForwardUseCase {
    fn analyze(&self, unit: &CompilationUnit) -> TaintResult<AnalysisReport> {
        self.execute(unit)
    }

    fn analyze_procedure(&self, unit: &CompilationUnit, name: &str) -> TaintResult<ProcedureReport> {
        let procedure = unit.procedure(name).ok_or_else(|| {
            TaintAnalysisError::invalid_input(format!("no procedure named '{}'", name))
                .with_context(unit.name.clone())
        })?;
        Ok(self.run_procedure(unit, procedure).report)
    }

    fn config(&self) -> &TaintConfig {
        &self.config
    }
}

fn unstable_error(reason: &UnstableReason) -> TaintAnalysisError {
    match reason {
        UnstableReason::Timeout { .. } => TaintAnalysisError::timeout(reason.to_string()),
        UnstableReason::IterationLimit { .. } | UnstableReason::NonMonotone { .. } => {
            TaintAnalysisError::unstable(reason.to_string())
        }
    }
}

fn failed_run(procedure: &Procedure, err: TaintAnalysisError) -> ProcedureRun {
    ProcedureRun {
        report: ProcedureReport {
            name: procedure.name.clone(),
            signature: procedure.signature(),
            status: ProcedureStatus::Failed { error: err.message },
            findings: Vec::new(),
            nodes: 0,
            guards: 0,
        },
        findings: Vec::new(),
        edges: 0,
        visits: 0,
        guard_evaluations: 0,
    }
}

/// Index of each repeated signature mapped to the index of its first declaration
fn duplicate_signatures(unit: &CompilationUnit) -> FxHashMap<usize, usize> {
    let mut first_seen = FxHashMap::default();
    let mut duplicates = FxHashMap::default();
    for (index, procedure) in unit.procedures.iter().enumerate() {
        let first = *first_seen.entry(procedure.signature()).or_insert(index);
        if first != index {
            duplicates.insert(index, first);
        }
    }
    duplicates
}
