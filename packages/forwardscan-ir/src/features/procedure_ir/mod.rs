// Procedure IR - input model produced by language front ends
//
// Only the domain layer exists: the IR is plain serde data and is
// consumed by taint_analysis.

pub mod domain;

pub use domain::*;
