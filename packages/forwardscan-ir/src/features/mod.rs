//! Feature modules - Each feature follows Hexagonal Architecture
//!
//! Each feature contains:
//! - domain/     - Pure business logic (no external dependencies)
//! - ports/      - Interface definitions (traits)
//! - application/ - Use cases
//! - infrastructure/ - External dependency implementations

// Procedure IR produced by language front ends
pub mod procedure_ir;

// URL-forward taint engine
pub mod taint_analysis;
