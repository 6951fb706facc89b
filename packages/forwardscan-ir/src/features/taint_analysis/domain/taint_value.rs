//! Taint lattice
//!
//! `TaintState` is the three-point lattice CLEAN ⊑ UNKNOWN ⊑ TAINTED.
//! `TaintValue` pairs it with the value's provenance (decode level, checks
//! passed, normalization flags). Joins are conservative in every component,
//! and CLEAN is bottom: it carries no provenance of its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Per-value taint state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaintState {
    Clean,
    Unknown,
    Tainted,
}

impl TaintState {
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }

    fn height(self) -> u32 {
        match self {
            TaintState::Clean => 0,
            TaintState::Unknown => 1,
            TaintState::Tainted => 2,
        }
    }
}

/// How far percent-decoding has progressed. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeLevel {
    /// Never decoded
    Raw,
    /// Decoded a fixed single time
    Once,
    /// No encoding markers can remain
    Canonical,
}

impl DecodeLevel {
    fn distance_to_canonical(self) -> u32 {
        match self {
            DecodeLevel::Raw => 2,
            DecodeLevel::Once => 1,
            DecodeLevel::Canonical => 0,
        }
    }
}

/// Operations applied to a value before it reaches a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrecedingOps {
    pub decode: DecodeLevel,
    /// Path normalization ran while the value was not canonical
    pub normalized_before_decode: bool,
    /// Only reachable when `contains("%")` held
    pub encoding_seen: bool,
    /// Path normalization ran on the canonical value
    pub normalized: bool,
    pub case_folded: bool,
}

impl Default for PrecedingOps {
    fn default() -> Self {
        Self {
            decode: DecodeLevel::Raw,
            normalized_before_decode: false,
            encoding_seen: false,
            normalized: false,
            case_folded: false,
        }
    }
}

impl PrecedingOps {
    pub fn join(&self, other: &Self) -> Self {
        Self {
            decode: self.decode.min(other.decode),
            normalized_before_decode: self.normalized_before_decode
                || other.normalized_before_decode,
            encoding_seen: self.encoding_seen || other.encoding_seen,
            normalized: self.normalized && other.normalized,
            case_folded: self.case_folded && other.case_folded,
        }
    }

    /// `self` is at least as well-processed as `other`
    pub fn at_least(&self, other: &Self) -> bool {
        self.decode >= other.decode
            && (!self.normalized_before_decode || other.normalized_before_decode)
            && (!self.encoding_seen || other.encoding_seen)
            && (self.normalized || !other.normalized)
            && (self.case_folded || !other.case_folded)
    }

    fn badness(&self) -> u32 {
        self.decode.distance_to_canonical()
            + u32::from(self.normalized_before_decode)
            + u32::from(self.encoding_seen)
            + u32::from(!self.normalized)
            + u32::from(!self.case_folded)
    }
}

/// A validation the value is known to have passed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// `equals` against a known constant
    ExactMatch { value: String },
    /// `startsWith(prefix)` holds for a canonical literal
    AllowPrefix { prefix: String },
    /// `!startsWith(prefix)` holds for a canonical literal, case-folded
    DenyPrefix { prefix: String },
    /// `!contains("..")`
    NoTraversal,
    /// `!contains("%")`
    NoEncoding,
}

impl Check {
    pub fn is_prefix(&self) -> bool {
        matches!(self, Check::AllowPrefix { .. } | Check::DenyPrefix { .. })
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::ExactMatch { value } => write!(f, "equals({:?})", value),
            Check::AllowPrefix { prefix } => write!(f, "startsWith({:?})", prefix),
            Check::DenyPrefix { prefix } => write!(f, "!startsWith({:?})", prefix),
            Check::NoTraversal => write!(f, "!contains(\"..\")"),
            Check::NoEncoding => write!(f, "!contains(\"%\")"),
        }
    }
}

/// Abstract value of one flow-graph node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintValue {
    pub state: TaintState,
    pub ops: PrecedingOps,
    pub checks: BTreeSet<Check>,
}

impl Default for TaintValue {
    fn default() -> Self {
        Self::clean()
    }
}

impl TaintValue {
    pub fn clean() -> Self {
        Self {
            state: TaintState::Clean,
            ops: PrecedingOps::default(),
            checks: BTreeSet::new(),
        }
    }

    /// Fresh untrusted input
    pub fn tainted() -> Self {
        Self {
            state: TaintState::Tainted,
            ..Self::clean()
        }
    }

    pub fn unknown() -> Self {
        Self {
            state: TaintState::Unknown,
            ..Self::clean()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.state == TaintState::Clean
    }

    pub fn is_tainted(&self) -> bool {
        self.state == TaintState::Tainted
    }

    pub fn has_check(&self, check: &Check) -> bool {
        self.checks.contains(check)
    }

    pub fn has_allow_prefix(&self) -> bool {
        self.checks
            .iter()
            .any(|c| matches!(c, Check::AllowPrefix { .. }))
    }

    pub fn has_deny_prefix(&self) -> bool {
        self.checks
            .iter()
            .any(|c| matches!(c, Check::DenyPrefix { .. }))
    }

    /// Least upper bound
    pub fn join(&self, other: &Self) -> Self {
        if self.is_clean() {
            return other.clone();
        }
        if other.is_clean() {
            return self.clone();
        }
        Self {
            state: self.state.join(other.state),
            ops: self.ops.join(&other.ops),
            checks: self.checks.intersection(&other.checks).cloned().collect(),
        }
    }

    /// Partial order: `self ⊑ other`
    pub fn leq(&self, other: &Self) -> bool {
        if self.is_clean() {
            return true;
        }
        if other.is_clean() {
            return false;
        }
        self.state <= other.state
            && self.ops.at_least(&other.ops)
            && other.checks.is_subset(&self.checks)
    }

    /// Lattice height consumed so far. `check_universe` bounds the number of
    /// distinct checks a value can hold in one graph.
    pub fn badness(&self, check_universe: usize) -> u32 {
        if self.is_clean() {
            return 0;
        }
        let missing_checks = check_universe.saturating_sub(self.checks.len()) as u32;
        self.state.height() + self.ops.badness() + missing_checks
    }

    /// Upper bound of `badness` for one node
    pub fn max_badness(check_universe: usize) -> u32 {
        let worst = Self {
            state: TaintState::Tainted,
            ops: PrecedingOps {
                decode: DecodeLevel::Raw,
                normalized_before_decode: true,
                encoding_seen: true,
                normalized: false,
                case_folded: false,
            },
            checks: BTreeSet::new(),
        };
        worst.badness(check_universe)
    }

    /// Normalizes a CLEAN result so equal states compare equal
    pub fn canonical_form(self) -> Self {
        if self.is_clean() {
            Self::clean()
        } else {
            self
        }
    }
}

impl fmt::Display for TaintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.state)?;
        if self.is_clean() {
            return Ok(());
        }
        write!(f, " decode={:?}", self.ops.decode)?;
        if !self.checks.is_empty() {
            let checks: Vec<String> = self.checks.iter().map(|c| c.to_string()).collect();
            write!(f, " checks=[{}]", checks.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny(prefix: &str) -> Check {
        Check::DenyPrefix {
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_tainted_join_clean_is_tainted() {
        let t = TaintValue::tainted();
        assert_eq!(t.join(&TaintValue::clean()), t);
        assert_eq!(TaintValue::clean().join(&t), t);
        assert_eq!(
            TaintValue::unknown().join(&t).state,
            TaintState::Tainted
        );
    }

    #[test]
    fn test_join_is_conservative_per_component() {
        let mut a = TaintValue::tainted();
        a.ops.decode = DecodeLevel::Canonical;
        a.ops.normalized = true;
        a.checks.insert(deny("/web-inf/"));
        a.checks.insert(Check::NoTraversal);

        let mut b = TaintValue::tainted();
        b.ops.decode = DecodeLevel::Once;
        b.ops.encoding_seen = true;
        b.checks.insert(Check::NoTraversal);

        let j = a.join(&b);
        assert_eq!(j.ops.decode, DecodeLevel::Once);
        assert!(j.ops.encoding_seen);
        assert!(!j.ops.normalized);
        assert_eq!(j.checks.len(), 1);
        assert!(j.has_check(&Check::NoTraversal));
        assert!(a.leq(&j));
        assert!(b.leq(&j));
    }

    #[test]
    fn test_badness_grows_along_order() {
        let mut better = TaintValue::tainted();
        better.ops.decode = DecodeLevel::Canonical;
        better.checks.insert(Check::NoEncoding);
        let worse = TaintValue::tainted();

        assert!(better.leq(&worse));
        assert!(!worse.leq(&better));
        assert!(better.badness(4) < worse.badness(4));
        assert!(worse.badness(4) <= TaintValue::max_badness(4));
        assert_eq!(TaintValue::clean().badness(4), 0);
    }

    #[test]
    fn test_clean_canonical_form_drops_provenance() {
        let mut v = TaintValue::tainted();
        v.state = TaintState::Clean;
        v.checks.insert(Check::NoEncoding);
        assert_eq!(v.canonical_form(), TaintValue::clean());
    }
}
