/*
 * Forwardscan IR - URL-Forward Taint Engine (CWE-552)
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Common models (Span)
 * - features/    : Vertical slices (procedure_ir → taint_analysis)
 * - config/      : Presets + YAML configuration
 *
 * Pipeline per procedure:
 *   Procedure IR → FlowGraph (guards, phis) → per-source worklist → findings
 *
 * Performance:
 * - Procedures analyzed independently on the Rayon work-stealing pool
 * - No shared mutable state between procedures
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Finding construction carries many parts
#![allow(clippy::should_implement_trait)] // from_str naming intentional
#![allow(clippy::upper_case_acronyms)] // DTO naming
#![allow(clippy::module_inception)] // Module naming intentional

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared models and utilities
pub mod shared;

/// Feature modules (procedure IR, taint analysis)
pub mod features;

/// Configuration system (presets + YAML v1)
pub mod config;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{ConfigError, LoadedConfig, Preset, TaintConfig};
pub use features::procedure_ir::{CompilationUnit, Expr, Procedure, Stmt};
pub use features::taint_analysis::{
    AnalysisReport, AnalyzeUrlForwardUseCase, FindingDTO, ResultReporter, SignatureCatalog,
    TaintAnalysisError, TaintResult, UrlForwardAnalysisService, Verdict,
};

/// Analyze a unit with the built-in catalog
pub fn analyze_unit(unit: &CompilationUnit, config: TaintConfig) -> TaintResult<AnalysisReport> {
    AnalyzeUrlForwardUseCase::with_default_catalog(config)?.execute(unit)
}
