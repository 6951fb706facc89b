// Taint analysis for unvalidated URL forwards (CWE-552)
//
// Hexagonal Architecture:
// - domain: Core data (TaintValue lattice, FlowNode, GuardCondition, Finding)
// - infrastructure: Technical implementations (catalog, graph builder, barriers, propagator)
// - ports: Interface boundaries (Service trait, DTOs, errors)
// - application: Use cases and orchestration

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

// Re-export application layer (primary interface)
pub use application::AnalyzeUrlForwardUseCase;

// Re-export domain types
pub use domain::{
    BarrierRule, BarrierVerdict, Finding, TaintState, TaintValue, UnstableReason, Verdict,
};

// Re-export infrastructure (internal use - prefer application layer)
#[doc(hidden)]
pub use infrastructure::*;
pub use ports::{
    AnalysisReport, AnalysisStats, BarrierDTO, FindingDTO, PathStepDTO, ProcedureReport,
    ProcedureStatus, TaintAnalysisError, TaintErrorKind, TaintResult, UrlForwardAnalysisService,
};
