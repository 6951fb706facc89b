//! Configuration I/O (YAML loading)
//!
//! Schema v1:
//!
//! ```yaml
//! version: 1
//! preset: balanced          # optional, default balanced
//! catalog: rules.yaml       # optional, relative to this file
//! overrides:                # optional, any subset of TaintConfig fields
//!   explain_suppressed: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ConfigResult};
use super::patch::TaintConfigPatch;
use super::preset::Preset;
use super::taint_config::TaintConfig;

pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigExportV1 {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Base preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Signature catalog replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// Fine-grained overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<TaintConfigPatch>,
}

/// Validated configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub preset: Preset,
    pub taint: TaintConfig,
    /// Catalog path resolved against the config file's directory
    pub catalog: Option<PathBuf>,
}

impl LoadedConfig {
    /// Parse YAML text; relative catalog paths resolve against `base_dir`
    pub fn from_yaml_str(content: &str, base_dir: Option<&Path>) -> ConfigResult<Self> {
        let export: ConfigExportV1 = serde_yaml::from_str(content)?;

        if !SUPPORTED_VERSIONS.contains(&export.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: export.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset = match export.preset.as_deref() {
            Some(name) => {
                Preset::from_str(name).map_err(|_| ConfigError::UnknownPreset(name.to_string()))?
            }
            None => Preset::default(),
        };

        let base = TaintConfig::from_preset(preset);
        let taint = match &export.overrides {
            Some(patch) => patch.apply_to(base),
            None => base,
        };
        taint.validate()?;

        let catalog = export.catalog.map(|p| match base_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p,
        });

        Ok(Self {
            preset,
            taint,
            catalog,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_yaml_str(&content, path.parent())
    }

    /// Serialize as schema v1, overrides relative to the preset
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let patch = TaintConfigPatch::diff(&TaintConfig::from_preset(self.preset), &self.taint);
        let export = ConfigExportV1 {
            version: 1,
            preset: Some(self.preset.to_string()),
            catalog: self.catalog.clone(),
            overrides: (!patch.is_empty()).then_some(patch),
        };
        serde_yaml::to_string(&export).map_err(ConfigError::Yaml)
    }
}

impl Default for LoadedConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            taint: TaintConfig::default(),
            catalog: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_yaml_roundtrip() {
        let config = LoadedConfig {
            preset: Preset::Fast,
            taint: TaintConfig::from_preset(Preset::Fast).explain_suppressed(true),
            catalog: None,
        };

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("preset: fast"));
        assert!(yaml.contains("explain_suppressed: true"));
        assert!(!yaml.contains("max_iterations"));

        let back = LoadedConfig::from_yaml_str(&yaml, None).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_yaml_loading_resolves_catalog() {
        let yaml_content = r#"
version: 1
preset: thorough
catalog: rules/forward.yaml
overrides:
  max_iterations: 5000
  parallel: false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = LoadedConfig::from_path(temp_file.path()).unwrap();
        assert_eq!(config.preset, Preset::Thorough);
        assert_eq!(config.taint.max_iterations, 5000);
        assert!(!config.taint.parallel);
        assert!(config.taint.explain_suppressed);

        let dir = temp_file.path().parent().unwrap();
        assert_eq!(config.catalog, Some(dir.join("rules/forward.yaml")));
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = LoadedConfig::from_yaml_str("preset: fast\n", None);
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = LoadedConfig::from_yaml_str("version: 2\npreset: fast\n", None);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::UnsupportedVersion { found: 2, .. }
        ));
    }

    #[test]
    fn test_yaml_unknown_override_rejected() {
        let yaml = "version: 1\noverrides:\n  max_depth: 3\n";
        assert!(matches!(
            LoadedConfig::from_yaml_str(yaml, None),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_yaml_override_out_of_range() {
        let yaml = "version: 1\noverrides:\n  max_iterations: 0\n";
        assert!(matches!(
            LoadedConfig::from_yaml_str(yaml, None),
            Err(ConfigError::Range { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LoadedConfig::from_path(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
