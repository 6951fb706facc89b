//! Barrier evaluations and findings

use serde::{Deserialize, Serialize};
use std::fmt;

use super::flow_node::GuardId;
use crate::shared::models::Span;

/// Outcome of evaluating one guard against one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierVerdict {
    Effective,
    Ineffective,
    /// Narrows the value but leaves a known bypass open
    Partial,
}

impl BarrierVerdict {
    pub fn is_effective(&self) -> bool {
        matches!(self, BarrierVerdict::Effective)
    }
}

/// Machine-checkable id of the rule that decided an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierRule {
    ExactLiteralMatch,
    InvertedEncodingGate,
    NormalizeBeforeDecode,
    SingleDecode,
    UndecodedCheck,
    NonCanonicalLiteral,
    CaseSensitiveDenyList,
    CanonicalAllowList,
    CanonicalDenyList,
    EncodingGate,
    MalformedGuard,
    NoApplicableRule,
}

impl BarrierRule {
    /// Evaluation order; lower runs first
    pub fn priority(&self) -> u8 {
        match self {
            BarrierRule::ExactLiteralMatch => 1,
            BarrierRule::InvertedEncodingGate => 2,
            BarrierRule::NormalizeBeforeDecode => 3,
            BarrierRule::SingleDecode => 4,
            BarrierRule::UndecodedCheck => 5,
            BarrierRule::NonCanonicalLiteral => 6,
            BarrierRule::CaseSensitiveDenyList => 7,
            BarrierRule::CanonicalAllowList => 8,
            BarrierRule::CanonicalDenyList => 9,
            BarrierRule::EncodingGate => 10,
            BarrierRule::MalformedGuard => 11,
            BarrierRule::NoApplicableRule => u8::MAX,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            BarrierRule::ExactLiteralMatch => "EXACT_LITERAL_MATCH",
            BarrierRule::InvertedEncodingGate => "INVERTED_ENCODING_GATE",
            BarrierRule::NormalizeBeforeDecode => "NORMALIZE_BEFORE_DECODE",
            BarrierRule::SingleDecode => "SINGLE_DECODE",
            BarrierRule::UndecodedCheck => "UNDECODED_CHECK",
            BarrierRule::NonCanonicalLiteral => "NON_CANONICAL_LITERAL",
            BarrierRule::CaseSensitiveDenyList => "CASE_SENSITIVE_DENY_LIST",
            BarrierRule::CanonicalAllowList => "CANONICAL_ALLOW_LIST",
            BarrierRule::CanonicalDenyList => "CANONICAL_DENY_LIST",
            BarrierRule::EncodingGate => "ENCODING_GATE",
            BarrierRule::MalformedGuard => "MALFORMED_GUARD",
            BarrierRule::NoApplicableRule => "NO_APPLICABLE_RULE",
        }
    }
}

impl fmt::Display for BarrierRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierEvaluation {
    pub verdict: BarrierVerdict,
    pub rule: BarrierRule,
    pub rationale: String,
}

impl BarrierEvaluation {
    pub fn new(verdict: BarrierVerdict, rule: BarrierRule, rationale: impl Into<String>) -> Self {
        Self {
            verdict,
            rule,
            rationale: rationale.into(),
        }
    }
}

/// Effective barrier recorded on a suppressed flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedBarrier {
    pub guard: GuardId,
    pub branch: bool,
    pub guard_text: String,
    pub span: Span,
    pub variable: String,
    pub evaluation: BarrierEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Flagged,
    SuppressedByBarrier,
}

/// One node on a reconstructed source-to-sink path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub node: usize,
    pub kind: String,
    pub text: String,
    pub span: Span,
}

/// Why a procedure's propagation was abandoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnstableReason {
    IterationLimit { visits: usize },
    Timeout { elapsed_ms: u64 },
    /// A transfer moved a node down the lattice
    NonMonotone { node: usize },
}

impl fmt::Display for UnstableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnstableReason::IterationLimit { visits } => {
                write!(f, "iteration ceiling hit after {} node visits", visits)
            }
            UnstableReason::Timeout { elapsed_ms } => {
                write!(f, "time budget exceeded after {}ms", elapsed_ms)
            }
            UnstableReason::NonMonotone { node } => {
                write!(f, "potential did not decrease at node {}", node)
            }
        }
    }
}

/// Source-to-sink result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub procedure: String,
    pub source: PathStep,
    pub sink: PathStep,
    pub path: Vec<PathStep>,
    pub verdict: Verdict,
    /// Effective barriers on the source-to-sink subgraph (suppressed findings)
    pub barriers: Vec<AppliedBarrier>,
    /// Reported by the conservative fallback of an unstable procedure
    pub unstable: bool,
}

impl Finding {
    pub fn is_flagged(&self) -> bool {
        self.verdict == Verdict::Flagged
    }

    /// Ordering key: sink position, then source position
    pub fn sort_key(&self) -> (Span, usize, Span, usize) {
        (self.sink.span, self.sink.node, self.source.span, self.source.node)
    }
}
