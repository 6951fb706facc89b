//! Decomposed boolean tests
//!
//! A `GuardCondition` records, per branch outcome, the atomic string checks
//! that definitely hold when control takes that branch. A conjunction holds
//! atom-wise on its true branch, a disjunction on its false branch. Anything
//! else contributes nothing definite.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::flow_node::GuardId;
use crate::shared::models::Span;

/// Recognized check operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardOperator {
    StartsWith,
    Contains,
    Equals,
    EqualsIgnoreCase,
    IsNull,
}

impl GuardOperator {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "startsWith" => Some(Self::StartsWith),
            "contains" => Some(Self::Contains),
            "equals" => Some(Self::Equals),
            "equalsIgnoreCase" => Some(Self::EqualsIgnoreCase),
            _ => None,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::StartsWith => "startsWith",
            Self::Contains => "contains",
            Self::Equals => "equals",
            Self::EqualsIgnoreCase => "equalsIgnoreCase",
            Self::IsNull => "isNull",
        }
    }
}

/// Right-hand side of a check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardOperand {
    Literal { value: String },
    /// Named constant resolved from the procedure or unit constant table
    Constant { name: String, value: String },
    Variable { name: String },
    Other { text: String },
    None,
}

impl GuardOperand {
    /// Statically known string value
    pub fn known_value(&self) -> Option<&str> {
        match self {
            GuardOperand::Literal { value } | GuardOperand::Constant { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for GuardOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardOperand::Literal { value } => write!(f, "{:?}", value),
            GuardOperand::Constant { name, .. } => write!(f, "{}", name),
            GuardOperand::Variable { name } => write!(f, "{}", name),
            GuardOperand::Other { text } => write!(f, "{}", text),
            GuardOperand::None => Ok(()),
        }
    }
}

/// `subject.operator(operand)`, possibly negated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardAtom {
    pub subject: String,
    pub operator: GuardOperator,
    pub operand: GuardOperand,
    pub negated: bool,
}

impl GuardAtom {
    pub fn new(subject: impl Into<String>, operator: GuardOperator, operand: GuardOperand) -> Self {
        Self {
            subject: subject.into(),
            operator,
            operand,
            negated: false,
        }
    }

    pub fn negated(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// `contains("%")`
    pub fn is_encoding_check(&self) -> bool {
        self.operator == GuardOperator::Contains && self.operand.known_value() == Some("%")
    }
}

impl fmt::Display for GuardAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "!" } else { "" };
        match self.operator {
            GuardOperator::IsNull => {
                let op = if self.negated { "!=" } else { "==" };
                write!(f, "{} {} null", self.subject, op)
            }
            op => write!(
                f,
                "{}{}.{}({})",
                not,
                self.subject,
                op.method_name(),
                self.operand
            ),
        }
    }
}

/// Decomposed predicate of one boolean test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardCondition {
    pub id: GuardId,
    /// Rendered test expression
    pub text: String,
    pub span: Span,
    /// Atoms that hold when the test is true
    pub on_true: Vec<GuardAtom>,
    /// Atoms that hold when the test is false
    pub on_false: Vec<GuardAtom>,
    /// Variables read by leaves that could not be decomposed
    pub opaque_subjects: Vec<String>,
    /// Boolean flag the test was read through (`while (hasEncoding)`)
    pub alias: Option<String>,
}

impl GuardCondition {
    pub fn new(id: GuardId, text: impl Into<String>, span: Span) -> Self {
        Self {
            id,
            text: text.into(),
            span,
            on_true: Vec::new(),
            on_false: Vec::new(),
            opaque_subjects: Vec::new(),
            alias: None,
        }
    }

    pub fn decomposable(&self) -> bool {
        self.opaque_subjects.is_empty()
    }

    pub fn atoms(&self, branch: bool) -> &[GuardAtom] {
        if branch {
            &self.on_true
        } else {
            &self.on_false
        }
    }

    /// Atoms holding for `subject` on `branch`
    pub fn atoms_for<'a>(&'a self, subject: &'a str, branch: bool) -> impl Iterator<Item = &'a GuardAtom> + 'a {
        self.atoms(branch).iter().filter(move |a| a.subject == subject)
    }

    /// Variables refined on `branch`: atom subjects first, then opaque subjects
    pub fn subjects(&self, branch: bool) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let names = self
            .atoms(branch)
            .iter()
            .map(|a| &a.subject)
            .chain(self.opaque_subjects.iter());
        for name in names {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    pub fn is_opaque_for(&self, subject: &str) -> bool {
        self.opaque_subjects.iter().any(|s| s == subject)
    }
}

impl fmt::Display for GuardCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.text)
    }
}
