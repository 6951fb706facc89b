//! Taint Analysis infrastructure
//!
//! URL-forward (CWE-552) taint engine:
//! - Signature catalog (sources, sinks, sanitizers from YAML)
//! - Flow graph builder (procedure IR -> value-flow graph with guard refinements)
//! - Literal canonicalizer (percent-decoding + dot-segment removal)
//! - Barrier evaluator (rule registry keyed by operator and decode context)
//! - Taint propagator (per-source worklist with potential-function convergence)
//! - Result reporter (DTO / JSON / text)

pub mod barrier_evaluator;
pub mod flow_graph_builder;
pub mod literal_canonicalizer;
pub mod result_reporter;
pub mod signature_catalog;
pub mod taint_propagator;

pub use barrier_evaluator::{
    apply_atoms, BarrierEvaluator, BarrierInput, BarrierOptions, CheckOperator, DecodeContext,
    RuleFn,
};
pub use flow_graph_builder::{AliasTable, BuildError, BuildResult, FlowGraph, FlowGraphBuilder};
pub use literal_canonicalizer::{allow_prefix_key, canonicalize, deny_prefix_key, CanonicalLiteral};
pub use result_reporter::ResultReporter;
pub use signature_catalog::{CatalogError, CatalogResult, SignatureCatalog, DEFAULT_CATALOG_YAML};
pub use taint_propagator::{
    PropagationLimits, PropagationOutcome, PropagationStats, PropagationStatus, TaintPropagator,
};
