//! Value-flow graph nodes and edges

use serde::{Deserialize, Serialize};
use std::fmt;

use super::signature::SanitizerKind;
use crate::shared::models::Span;

/// Index of a guard in `FlowGraph::guards`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuardId(pub usize);

impl fmt::Display for GuardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Node kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    SourceCall,
    SinkCall {
        /// Argument positions checked for taint
        args: Vec<usize>,
    },
    SanitizerCall {
        sanitizer: SanitizerKind,
    },
    Literal,
    Concat,
    /// One SSA definition of a variable (or a parameter)
    VariableRef,
    /// Branch-local refinement of a variable by a boolean test
    Guard {
        guard: GuardId,
        branch: bool,
    },
    /// Call with no catalog role
    Call,
    /// Join of reaching definitions
    Phi,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::SourceCall => "SOURCE_CALL",
            NodeKind::SinkCall { .. } => "SINK_CALL",
            NodeKind::SanitizerCall { .. } => "SANITIZER_CALL",
            NodeKind::Literal => "LITERAL",
            NodeKind::Concat => "CONCAT",
            NodeKind::VariableRef => "VARIABLE_REF",
            NodeKind::Guard { .. } => "GUARD",
            NodeKind::Call => "CALL",
            NodeKind::Phi => "PHI",
        }
    }
}

/// Immutable graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub kind: NodeKind,
    /// Rendered operand text, used for matching and explanations
    pub text: String,
    pub span: Span,
    /// Variable defined (VARIABLE_REF, PHI) or refined (GUARD)
    pub var: Option<String>,
}

impl FlowNode {
    pub fn new(kind: NodeKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            var: None,
        }
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, NodeKind::SourceCall)
    }

    pub fn is_sink(&self) -> bool {
        matches!(self.kind, NodeKind::SinkCall { .. })
    }

    pub fn guard(&self) -> Option<(GuardId, bool)> {
        match self.kind {
            NodeKind::Guard { guard, branch } => Some((guard, branch)),
            _ => None,
        }
    }
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` @{}", self.kind.label(), self.text, self.span)
    }
}

/// Edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    /// RHS to the defined variable
    Assign,
    Argument { index: usize },
    /// Receiver to call (method chaining)
    Receiver,
    ConcatOperand { index: usize },
    /// Concat operand placed after a `?` literal; never carries taint
    QueryString,
    /// Reaching definition into a guard refinement
    Refine,
    LoopBack,
    Join,
}

/// Branch tag of a guard-conditioned edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardTag {
    pub guard: GuardId,
    pub branch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEdge {
    pub kind: EdgeKind,
    /// Set when the edge is only traversable under one branch outcome
    pub tag: Option<GuardTag>,
}

impl FlowEdge {
    pub fn new(kind: EdgeKind) -> Self {
        Self { kind, tag: None }
    }

    pub fn refine(guard: GuardId, branch: bool) -> Self {
        Self {
            kind: EdgeKind::Refine,
            tag: Some(GuardTag { guard, branch }),
        }
    }

    /// Whether taint travels along this edge
    pub fn carries_taint(&self) -> bool {
        !matches!(self.kind, EdgeKind::QueryString)
    }
}
