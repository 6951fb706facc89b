//! Call roles assigned by the signature catalog
//!
//! The catalog only tags calls. Whether a decode or a check actually
//! neutralizes taint is decided later by the barrier evaluator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sanitizer-like operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizerKind {
    /// Percent-decoding (`URLDecoder.decode`)
    Decode,
    /// `.`/`..` segment resolution (`Path.normalize`)
    Normalize,
    /// `toLowerCase` / `toUpperCase`
    CaseFold,
}

/// Role of a call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum CallRole {
    Source,
    Sink {
        /// Argument positions whose taint constitutes a finding
        args: Vec<usize>,
    },
    Sanitizer {
        kind: SanitizerKind,
    },
    Neutral,
}

impl CallRole {
    pub fn is_source(&self) -> bool {
        matches!(self, CallRole::Source)
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, CallRole::Sink { .. })
    }
}

impl fmt::Display for CallRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallRole::Source => write!(f, "SOURCE"),
            CallRole::Sink { args } => write!(f, "SINK{:?}", args),
            CallRole::Sanitizer { kind } => write!(f, "SANITIZER({:?})", kind),
            CallRole::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// What the catalog sees of one call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSignature<'a> {
    /// Static type of the receiver (or the declaring type of a static call)
    pub receiver_type: Option<&'a str>,
    /// Method name, or the class name for constructors
    pub name: &'a str,
    pub arity: usize,
    pub is_constructor: bool,
}

impl<'a> CallSignature<'a> {
    pub fn method(receiver_type: Option<&'a str>, name: &'a str, arity: usize) -> Self {
        Self {
            receiver_type,
            name,
            arity,
            is_constructor: false,
        }
    }

    pub fn constructor(class: &'a str, arity: usize) -> Self {
        Self {
            receiver_type: None,
            name: class,
            arity,
            is_constructor: true,
        }
    }
}

impl fmt::Display for CallSignature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_constructor {
            return write!(f, "new {}/{}", self.name, self.arity);
        }
        match self.receiver_type {
            Some(t) => write!(f, "{}.{}/{}", t, self.name, self.arity),
            None => write!(f, "{}/{}", self.name, self.arity),
        }
    }
}
