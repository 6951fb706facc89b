/*
 * Signature Catalog
 *
 * Maps call signatures to roles (SOURCE / SINK / SANITIZER / NEUTRAL).
 *
 * - YAML-defined, the default catalog is embedded at compile time
 * - Exact or regex method matching, optional receiver-type suffix
 * - Constructor entries (`new ModelAndView(..)`)
 * - Request-handler parameters and `return "forward:" + ..` rules
 *
 * Matching priority: sink > source > sanitizer > neutral.
 * Unknown signatures are NEUTRAL.
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::features::procedure_ir::{Param, Procedure};
use crate::features::taint_analysis::domain::{CallRole, CallSignature, SanitizerKind};

/// Default catalog source
pub const DEFAULT_CATALOG_YAML: &str = include_str!("../../../../catalog/url_forward.yaml");

const CATALOG_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog YAML is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported catalog version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("entry {index}: unknown role '{role}' (expected source, sink, sanitizer or neutral)")]
    UnknownRole { index: usize, role: String },

    #[error("entry {index}: unknown sanitizer kind '{kind}'")]
    UnknownSanitizerKind { index: usize, kind: String },

    #[error("entry {index}: sanitizer entries need a `kind`")]
    MissingSanitizerKind { index: usize },

    #[error("entry {index}: sink entries need at least one argument position")]
    MissingSinkArgs { index: usize },

    #[error("entry {index}: exactly one of `method`, `pattern` or `constructor` is required")]
    AmbiguousMatcher { index: usize },

    #[error("entry {index}: invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// Serialized form
// ============================================================================

/// Request-handler rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSpec {
    /// Annotation name suffix marking a request handler (`GetMapping`, `PostMapping`, ...)
    #[serde(default = "default_annotation_suffix")]
    pub annotation_suffix: String,

    /// Declared parameter types treated as untrusted input
    #[serde(default = "default_param_types")]
    pub param_types: Vec<String>,

    /// Leading literals that turn a returned string into a forward
    #[serde(default = "default_forward_prefixes")]
    pub forward_prefixes: Vec<String>,
}

fn default_annotation_suffix() -> String {
    "Mapping".to_string()
}

fn default_param_types() -> Vec<String> {
    vec!["String".to_string()]
}

fn default_forward_prefixes() -> Vec<String> {
    vec!["forward:".to_string()]
}

impl Default for HandlerSpec {
    fn default() -> Self {
        Self {
            annotation_suffix: default_annotation_suffix(),
            param_types: default_param_types(),
            forward_prefixes: default_forward_prefixes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntrySpec {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSpec {
    pub version: u32,
    #[serde(default)]
    pub handler: HandlerSpec,
    #[serde(default)]
    pub entries: Vec<CatalogEntrySpec>,
}

// ============================================================================
// Compiled catalog
// ============================================================================

#[derive(Debug, Clone)]
enum NameMatcher {
    Exact(String),
    Pattern(Regex),
    Constructor(String),
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    matcher: NameMatcher,
    receiver: Option<String>,
    role: CallRole,
}

/// `a.b.StaplerResponse` ends with type `StaplerResponse`
fn type_suffix_matches(actual: &str, suffix: &str) -> bool {
    actual == suffix
        || (actual.ends_with(suffix) && actual[..actual.len() - suffix.len()].ends_with('.'))
}

impl CatalogEntry {
    fn matches(&self, sig: &CallSignature<'_>) -> bool {
        let name_ok = match &self.matcher {
            NameMatcher::Constructor(class) => {
                sig.is_constructor && type_suffix_matches(sig.name, class)
            }
            NameMatcher::Exact(name) => !sig.is_constructor && sig.name == name,
            NameMatcher::Pattern(re) => !sig.is_constructor && re.is_match(sig.name),
        };
        if !name_ok {
            return false;
        }
        match (&self.receiver, sig.receiver_type) {
            (None, _) => true,
            (Some(expected), Some(actual)) => type_suffix_matches(actual, expected),
            (Some(_), None) => false,
        }
    }

    /// Sink positions present at this call site
    fn sink_args_for(&self, arity: usize) -> Option<Vec<usize>> {
        match &self.role {
            CallRole::Sink { args } => {
                let present: Vec<usize> = args.iter().copied().filter(|&i| i < arity).collect();
                (!present.is_empty()).then_some(present)
            }
            _ => None,
        }
    }
}

/// Compiled signature catalog
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    spec: CatalogSpec,
    entries: Vec<CatalogEntry>,
}

impl SignatureCatalog {
    /// Embedded default catalog
    pub fn url_forward_default() -> CatalogResult<Self> {
        Self::from_yaml_str(DEFAULT_CATALOG_YAML)
    }

    pub fn from_yaml_str(yaml: &str) -> CatalogResult<Self> {
        let spec: CatalogSpec = serde_yaml::from_str(yaml)?;
        Self::compile(spec)
    }

    pub fn from_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn compile(spec: CatalogSpec) -> CatalogResult<Self> {
        if spec.version != CATALOG_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                found: spec.version,
                expected: CATALOG_VERSION,
            });
        }

        let mut entries = Vec::with_capacity(spec.entries.len());
        for (index, entry) in spec.entries.iter().enumerate() {
            entries.push(Self::compile_entry(index, entry)?);
        }

        Ok(Self { spec, entries })
    }

    fn compile_entry(index: usize, entry: &CatalogEntrySpec) -> CatalogResult<CatalogEntry> {
        let role = match entry.role.as_str() {
            "source" => CallRole::Source,
            "sink" => {
                if entry.args.is_empty() {
                    return Err(CatalogError::MissingSinkArgs { index });
                }
                CallRole::Sink {
                    args: entry.args.clone(),
                }
            }
            "sanitizer" => {
                let kind = match entry.kind.as_deref() {
                    Some("decode") => SanitizerKind::Decode,
                    Some("normalize") => SanitizerKind::Normalize,
                    Some("case_fold") => SanitizerKind::CaseFold,
                    Some(other) => {
                        return Err(CatalogError::UnknownSanitizerKind {
                            index,
                            kind: other.to_string(),
                        })
                    }
                    None => return Err(CatalogError::MissingSanitizerKind { index }),
                };
                CallRole::Sanitizer { kind }
            }
            "neutral" => CallRole::Neutral,
            other => {
                return Err(CatalogError::UnknownRole {
                    index,
                    role: other.to_string(),
                })
            }
        };

        let mut receiver = entry.receiver.clone();
        let matcher = match (&entry.method, &entry.pattern, &entry.constructor) {
            (Some(method), None, None) => match method.rsplit_once('.') {
                // "URLDecoder.decode": receiver-type suffix + method name
                Some((ty, name)) => {
                    receiver.get_or_insert_with(|| ty.to_string());
                    NameMatcher::Exact(name.to_string())
                }
                None => NameMatcher::Exact(method.clone()),
            },
            (None, Some(pattern), None) => {
                let re = Regex::new(pattern).map_err(|source| CatalogError::InvalidPattern {
                    index,
                    pattern: pattern.clone(),
                    source,
                })?;
                NameMatcher::Pattern(re)
            }
            (None, None, Some(class)) => NameMatcher::Constructor(class.clone()),
            _ => return Err(CatalogError::AmbiguousMatcher { index }),
        };

        Ok(CatalogEntry {
            matcher,
            receiver,
            role,
        })
    }

    pub fn spec(&self) -> &CatalogSpec {
        &self.spec
    }

    pub fn to_yaml(&self) -> CatalogResult<String> {
        Ok(serde_yaml::to_string(&self.spec)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'a>(
        &'a self,
        sig: &'a CallSignature<'a>,
    ) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries.iter().filter(move |e| e.matches(sig))
    }

    /// Classify one call site
    pub fn classify(&self, sig: &CallSignature<'_>) -> CallRole {
        if let Some(args) = self.matching(sig).find_map(|e| e.sink_args_for(sig.arity)) {
            return CallRole::Sink { args };
        }
        if self.matching(sig).any(|e| e.role.is_source()) {
            return CallRole::Source;
        }
        if let Some(kind) = self.matching(sig).find_map(|e| match e.role {
            CallRole::Sanitizer { kind } => Some(kind),
            _ => None,
        }) {
            return CallRole::Sanitizer { kind };
        }
        CallRole::Neutral
    }

    /// Procedure is a request handler (carries a `*Mapping` annotation)
    pub fn is_request_handler(&self, procedure: &Procedure) -> bool {
        procedure.has_annotation_suffix(&self.spec.handler.annotation_suffix)
    }

    /// Parameter of a request handler carrying untrusted input
    pub fn is_handler_source(&self, procedure: &Procedure, param: &Param) -> bool {
        self.is_request_handler(procedure)
            && self
                .spec
                .handler
                .param_types
                .iter()
                .any(|t| type_suffix_matches(&param.ty, t))
    }

    /// Leading literal of a handler return value that makes it a forward
    pub fn is_forward_prefix(&self, literal: &str) -> bool {
        self.spec
            .handler
            .forward_prefixes
            .iter()
            .any(|p| literal.starts_with(p.as_str()))
    }
}
