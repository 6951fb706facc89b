//! Patch types with all-optional fields
//!
//! A patch overrides individual fields of a preset's configuration.

use serde::{Deserialize, Serialize};

use super::taint_config::TaintConfig;

/// Patch type for TaintConfig (all fields optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaintConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_suppressed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive_dispatch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_path_len: Option<usize>,
}

impl TaintConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields on top of `base`
    pub fn apply_to(&self, mut base: TaintConfig) -> TaintConfig {
        if let Some(v) = self.max_iterations {
            base.max_iterations = v;
        }
        if let Some(v) = self.timeout_ms {
            base.timeout_ms = v;
        }
        if let Some(v) = self.explain_suppressed {
            base.explain_suppressed = v;
        }
        if let Some(v) = self.case_insensitive_dispatch {
            base.case_insensitive_dispatch = v;
        }
        if let Some(v) = self.parallel {
            base.parallel = v;
        }
        if let Some(v) = self.max_path_len {
            base.max_path_len = v;
        }
        base
    }

    /// Fields of `config` that differ from `base`
    pub fn diff(base: &TaintConfig, config: &TaintConfig) -> Self {
        fn changed<T: PartialEq + Copy>(a: T, b: T) -> Option<T> {
            (a != b).then_some(b)
        }
        Self {
            max_iterations: changed(base.max_iterations, config.max_iterations),
            timeout_ms: changed(base.timeout_ms, config.timeout_ms),
            explain_suppressed: changed(base.explain_suppressed, config.explain_suppressed),
            case_insensitive_dispatch: changed(
                base.case_insensitive_dispatch,
                config.case_insensitive_dispatch,
            ),
            parallel: changed(base.parallel, config.parallel),
            max_path_len: changed(base.max_path_len, config.max_path_len),
        }
    }
}
