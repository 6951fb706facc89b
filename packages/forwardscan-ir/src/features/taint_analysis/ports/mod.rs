/*
 * Taint Analysis Ports (Hexagonal Architecture)
 *
 * Ports define the boundaries between the domain/infrastructure and external world.
 *
 * Architecture:
 * ```
 *                    +-------------------------+
 *                    |     External World      |
 *                    |      (CLI, Tests)       |
 *                    +------------+------------+
 *                                 |
 *                    +------------v------------+
 *                    |      Input Port         | ← Driving adapters call this
 *                    | (UrlForwardAnalysis-    |
 *                    |  Service)               |
 *                    +------------+------------+
 *                                 |
 *                    +------------v------------+
 *                    |    Application Layer    |
 *                    |      (Use Cases)        |
 *                    +------------+------------+
 *                                 |
 *                    +------------v------------+
 *                    |  Domain/Infrastructure  |
 *                    | (graph, barriers, taint)|
 *                    +-------------------------+
 * ```
 *
 * The core is a pure function (unit, catalog, config) -> AnalysisReport.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{AppliedBarrier, Finding, PathStep, Verdict};
use super::infrastructure::{BuildError, CatalogError};
use crate::config::{ConfigError, TaintConfig};
use crate::features::procedure_ir::CompilationUnit;

// ============================================================================
// DTOs (Data Transfer Objects)
// ============================================================================

/// One node of a reported path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStepDTO {
    pub kind: String,
    pub text: String,
    /// `line:col`
    pub location: String,
}

impl From<&PathStep> for PathStepDTO {
    fn from(step: &PathStep) -> Self {
        Self {
            kind: step.kind.clone(),
            text: step.text.clone(),
            location: step.span.to_string(),
        }
    }
}

/// Effective barrier on a suppressed flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierDTO {
    pub guard: String,
    pub branch: bool,
    pub variable: String,
    pub location: String,
    pub rule: String,
    pub verdict: String,
    pub rationale: String,
}

impl From<&AppliedBarrier> for BarrierDTO {
    fn from(b: &AppliedBarrier) -> Self {
        Self {
            guard: b.guard_text.clone(),
            branch: b.branch,
            variable: b.variable.clone(),
            location: b.span.to_string(),
            rule: b.evaluation.rule.id().to_string(),
            verdict: format!("{:?}", b.evaluation.verdict).to_uppercase(),
            rationale: b.evaluation.rationale.clone(),
        }
    }
}

/// Finding for external communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingDTO {
    pub procedure: String,
    /// FLAGGED | SUPPRESSED_BY_BARRIER
    pub verdict: Verdict,
    pub cwe: String,
    pub source: PathStepDTO,
    pub sink: PathStepDTO,
    pub path: Vec<PathStepDTO>,
    pub path_length: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub barriers: Vec<BarrierDTO>,
    /// Reported by the fallback of an unstable procedure
    #[serde(default)]
    pub unstable: bool,
}

impl From<&Finding> for FindingDTO {
    fn from(f: &Finding) -> Self {
        Self {
            procedure: f.procedure.clone(),
            verdict: f.verdict,
            cwe: "CWE-552".to_string(),
            source: (&f.source).into(),
            sink: (&f.sink).into(),
            path: f.path.iter().map(PathStepDTO::from).collect(),
            path_length: f.path.len(),
            barriers: f.barriers.iter().map(BarrierDTO::from).collect(),
            unstable: f.unstable,
        }
    }
}

impl FindingDTO {
    pub fn is_flagged(&self) -> bool {
        self.verdict == Verdict::Flagged
    }
}

/// Outcome of one procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcedureStatus {
    Complete,
    /// Propagation abandoned; findings come from the reachability fallback
    Unstable { reason: String },
    /// Graph construction failed; no findings
    Failed { error: String },
}

impl ProcedureStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ProcedureStatus::Complete)
    }
}

impl ProcedureReport {
    /// Signature when known, bare name otherwise
    pub fn label(&self) -> &str {
        if self.signature.is_empty() {
            &self.name
        } else {
            &self.signature
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureReport {
    pub name: String,
    /// Name plus parameter types; differs between overloads
    #[serde(default)]
    pub signature: String,
    #[serde(flatten)]
    pub status: ProcedureStatus,
    pub findings: Vec<FindingDTO>,
    pub nodes: usize,
    pub guards: usize,
}

/// Analysis statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub procedures_analyzed: usize,
    pub procedures_unstable: usize,
    pub procedures_failed: usize,
    pub nodes_analyzed: usize,
    pub edges_analyzed: usize,
    pub node_visits: usize,
    pub guard_evaluations: usize,
    pub findings_flagged: usize,
    pub findings_suppressed: usize,
    pub analysis_time_ms: u64,
}

/// Result of analyzing one compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub unit: String,
    /// All findings, ordered by procedure, then sink, then source position
    pub findings: Vec<FindingDTO>,
    pub procedures: Vec<ProcedureReport>,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    pub fn flagged(&self) -> impl Iterator<Item = &FindingDTO> {
        self.findings.iter().filter(|f| f.is_flagged())
    }

    pub fn has_flagged(&self) -> bool {
        self.flagged().next().is_some()
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureReport> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// Input Port (Driving Port)
// ============================================================================

/// Main input port for URL-forward analysis
///
/// External adapters (CLI, tests) drive the analysis through this trait.
pub trait UrlForwardAnalysisService: Send + Sync {
    /// Analyze every procedure of a unit
    fn analyze(&self, unit: &CompilationUnit) -> TaintResult<AnalysisReport>;

    /// Analyze a single procedure by name
    fn analyze_procedure(&self, unit: &CompilationUnit, name: &str) -> TaintResult<ProcedureReport>;

    /// Active configuration
    fn config(&self) -> &TaintConfig;
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintErrorKind {
    InvalidInput,
    Catalog,
    Unstable,
    Timeout,
    Internal,
}

/// Error type for taint analysis operations
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{kind:?}] {message}{}", context_suffix(.context))]
pub struct TaintAnalysisError {
    pub kind: TaintErrorKind,
    pub message: String,
    pub context: Option<String>,
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(ctx) => format!(" (context: {})", ctx),
        None => String::new(),
    }
}

pub type TaintResult<T> = Result<T, TaintAnalysisError>;

impl TaintAnalysisError {
    pub fn new(kind: TaintErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(TaintErrorKind::InvalidInput, message)
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::new(TaintErrorKind::Catalog, message)
    }

    pub fn unstable(message: impl Into<String>) -> Self {
        Self::new(TaintErrorKind::Unstable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TaintErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TaintErrorKind::Internal, message)
    }
}

impl From<CatalogError> for TaintAnalysisError {
    fn from(err: CatalogError) -> Self {
        Self::catalog(err.to_string())
    }
}

impl From<BuildError> for TaintAnalysisError {
    fn from(err: BuildError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

impl From<ConfigError> for TaintAnalysisError {
    fn from(err: ConfigError) -> Self {
        Self::invalid_input(err.to_string()).with_context("configuration")
    }
}

impl From<serde_json::Error> for TaintAnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input(err.to_string()).with_context("compilation unit JSON")
    }
}
