//! Configuration System
//!
//! Two tiers:
//! - Level 1: Preset - fast / balanced / thorough
//! - Level 2: YAML (schema v1) - preset + field overrides + catalog path
//!
//! # Examples
//!
//! ```rust,ignore
//! use forwardscan_ir::config::{LoadedConfig, Preset, TaintConfig};
//!
//! // Level 1: preset with builder overrides
//! let config = TaintConfig::from_preset(Preset::Fast).explain_suppressed(true);
//! config.validate()?;
//!
//! // Level 2: YAML
//! let loaded = LoadedConfig::from_path("forwardscan.yaml")?;
//! ```

pub mod error;
pub mod io;
pub mod patch;
pub mod preset;
pub mod taint_config;
pub mod validation;

// Re-exports
pub use error::{ConfigError, ConfigResult};
pub use io::{ConfigExportV1, LoadedConfig, SUPPORTED_VERSIONS};
pub use patch::TaintConfigPatch;
pub use preset::Preset;
pub use taint_config::TaintConfig;
pub use validation::Validatable;
