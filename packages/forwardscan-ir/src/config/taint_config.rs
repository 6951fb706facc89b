//! URL-forward taint analysis configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigResult;
use super::preset::Preset;
use super::validation::{check_range, Validatable};
use crate::features::taint_analysis::infrastructure::{BarrierOptions, PropagationLimits};

pub const MAX_ITERATIONS_LIMIT: usize = 1_000_000;
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;
pub const MAX_PATH_LEN_LIMIT: usize = 10_000;

/// Taint analysis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintConfig {
    /// Node visits per procedure before it is UNSTABLE (1..=1_000_000)
    pub max_iterations: usize,

    /// Per-procedure time budget in milliseconds, 0 = unlimited (0..=3_600_000)
    pub timeout_ms: u64,

    /// Report SUPPRESSED_BY_BARRIER findings with their barrier rationale
    pub explain_suppressed: bool,

    /// The servlet container resolves dispatch paths case-insensitively
    pub case_insensitive_dispatch: bool,

    /// Analyze procedures in parallel (rayon)
    pub parallel: bool,

    /// Longest reconstructed source-to-sink path (2..=10_000)
    pub max_path_len: usize,
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl TaintConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                max_iterations: 10_000,
                timeout_ms: 1_000,
                explain_suppressed: false,
                case_insensitive_dispatch: false,
                parallel: true,
                max_path_len: 16,
            },
            Preset::Balanced => Self {
                max_iterations: 100_000,
                timeout_ms: 10_000,
                explain_suppressed: false,
                case_insensitive_dispatch: false,
                parallel: true,
                max_path_len: 64,
            },
            Preset::Thorough => Self {
                max_iterations: MAX_ITERATIONS_LIMIT,
                timeout_ms: 0,
                explain_suppressed: true,
                case_insensitive_dispatch: false,
                parallel: true,
                max_path_len: 256,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_iterations",
            self.max_iterations as u64,
            1,
            MAX_ITERATIONS_LIMIT as u64,
            "Node visits per procedure must be finite and at least 1",
        )?;
        check_range(
            "timeout_ms",
            self.timeout_ms,
            0,
            MAX_TIMEOUT_MS,
            "Use 0 for no time budget, otherwise at most one hour",
        )?;
        check_range(
            "max_path_len",
            self.max_path_len as u64,
            2,
            MAX_PATH_LEN_LIMIT as u64,
            "A path holds at least its source and its sink",
        )?;
        Ok(())
    }

    /// Builder: Set max_iterations
    pub fn max_iterations(mut self, v: usize) -> Self {
        self.max_iterations = v;
        self
    }

    /// Builder: Set timeout_ms
    pub fn timeout_ms(mut self, v: u64) -> Self {
        self.timeout_ms = v;
        self
    }

    /// Builder: Set explain_suppressed
    pub fn explain_suppressed(mut self, v: bool) -> Self {
        self.explain_suppressed = v;
        self
    }

    /// Builder: Set case_insensitive_dispatch
    pub fn case_insensitive_dispatch(mut self, v: bool) -> Self {
        self.case_insensitive_dispatch = v;
        self
    }

    /// Builder: Set parallel
    pub fn parallel(mut self, v: bool) -> Self {
        self.parallel = v;
        self
    }

    /// Builder: Set max_path_len
    pub fn max_path_len(mut self, v: usize) -> Self {
        self.max_path_len = v;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn propagation_limits(&self) -> PropagationLimits {
        PropagationLimits {
            max_iterations: self.max_iterations,
            timeout: self.timeout(),
            max_path_len: self.max_path_len,
            explain_suppressed: self.explain_suppressed,
        }
    }

    pub fn barrier_options(&self) -> BarrierOptions {
        BarrierOptions {
            case_insensitive_dispatch: self.case_insensitive_dispatch,
        }
    }
}

impl Validatable for TaintConfig {
    fn validate(&self) -> ConfigResult<()> {
        TaintConfig::validate(self)
    }

    fn config_name(&self) -> &'static str {
        "TaintConfig"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_presets_are_valid() {
        for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough] {
            TaintConfig::from_preset(preset).validate().unwrap();
        }
    }

    #[test]
    fn test_preset_ordering() {
        let fast = TaintConfig::from_preset(Preset::Fast);
        let thorough = TaintConfig::from_preset(Preset::Thorough);
        assert!(fast.max_iterations < thorough.max_iterations);
        assert!(thorough.explain_suppressed);
        assert_eq!(thorough.timeout(), None);
        assert_eq!(fast.timeout(), Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = TaintConfig::default().max_iterations(0).validate().unwrap_err();
        match err {
            ConfigError::Range { field, .. } => assert_eq!(field, "max_iterations"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_upper_bounds() {
        assert!(TaintConfig::default()
            .max_iterations(MAX_ITERATIONS_LIMIT + 1)
            .validate()
            .is_err());
        assert!(TaintConfig::default()
            .timeout_ms(MAX_TIMEOUT_MS + 1)
            .validate()
            .is_err());
        assert!(TaintConfig::default().max_path_len(1).validate().is_err());
    }

    #[test]
    fn test_limits_mapping() {
        let config = TaintConfig::default()
            .timeout_ms(0)
            .explain_suppressed(true)
            .case_insensitive_dispatch(true);
        let limits = config.propagation_limits();
        assert_eq!(limits.timeout, None);
        assert!(limits.explain_suppressed);
        assert!(config.barrier_options().case_insensitive_dispatch);
    }
}
