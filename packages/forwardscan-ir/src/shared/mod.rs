//! Shared module - Common types and utilities
//!
//! Types used by more than one feature. No dependency on the analysis features.

pub mod models;

pub use models::*;
