/*
 * Barrier Evaluator
 *
 * Decides whether a guard neutralizes the value it refines:
 *   evaluate(guard, branch, value, preceding ops) -> EFFECTIVE | INEFFECTIVE | PARTIAL
 *
 * Registry of pure rule functions keyed by (check operator, decode context).
 * The guard's operators select the candidate rules, which run in priority
 * order; the first conclusive rule wins. No conclusive rule means
 * INEFFECTIVE / NO_APPLICABLE_RULE.
 *
 * Effectiveness is antitone in the value's checks: a value holding more
 * checks is never judged less effective. The propagator's convergence
 * depends on it.
 */

use rustc_hash::FxHashMap;

use super::literal_canonicalizer::{allow_prefix_key, canonicalize, deny_prefix_key};
use crate::features::taint_analysis::domain::{
    BarrierEvaluation, BarrierRule, BarrierVerdict, Check, DecodeLevel, GuardAtom,
    GuardCondition, GuardOperator, PrecedingOps, TaintValue,
};

// ============================================================================
// Keys
// ============================================================================

/// Operator half of a registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckOperator {
    Check(GuardOperator),
    /// Guard did not decompose into atoms for the subject
    Opaque,
}

/// Decode history of the checked value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeContext {
    Raw,
    Once,
    Canonical,
    /// Path-normalized while still encoded
    NormalizedRaw,
}

impl DecodeContext {
    pub const ALL: [DecodeContext; 4] = [
        DecodeContext::Raw,
        DecodeContext::Once,
        DecodeContext::Canonical,
        DecodeContext::NormalizedRaw,
    ];

    pub fn of(ops: &PrecedingOps) -> Self {
        match ops.decode {
            DecodeLevel::Canonical => DecodeContext::Canonical,
            _ if ops.normalized_before_decode => DecodeContext::NormalizedRaw,
            DecodeLevel::Once => DecodeContext::Once,
            DecodeLevel::Raw => DecodeContext::Raw,
        }
    }
}

// ============================================================================
// Rule input / functions
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierOptions {
    /// The dispatcher resolves paths case-insensitively
    pub case_insensitive_dispatch: bool,
}

/// Everything a rule may look at
#[derive(Debug, Clone, Copy)]
pub struct BarrierInput<'a> {
    pub guard: &'a GuardCondition,
    pub branch: bool,
    pub subject: &'a str,
    /// Atoms of this guard holding for `subject` on `branch`
    pub atoms: &'a [GuardAtom],
    /// Value with the atoms applied
    pub value: &'a TaintValue,
    pub options: BarrierOptions,
}

impl BarrierInput<'_> {
    fn ops(&self) -> &PrecedingOps {
        &self.value.ops
    }

    fn has_path_check(&self) -> bool {
        self.value.checks.iter().any(|c| c.is_prefix()) || self.value.has_check(&Check::NoTraversal)
    }

    fn describe_checks(&self) -> String {
        let mut parts: Vec<String> = self.value.checks.iter().map(|c| c.to_string()).collect();
        if parts.is_empty() {
            parts = self.atoms.iter().map(|a| a.to_string()).collect();
        }
        parts.join(" && ")
    }
}

type RuleOutcome = (BarrierVerdict, String);

/// Pure rule evaluator; `None` means not conclusive
pub type RuleFn = fn(&BarrierInput<'_>) -> Option<RuleOutcome>;

fn exact_literal_match(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    let atom = input.atoms.iter().find(|a| {
        matches!(
            a.operator,
            GuardOperator::Equals | GuardOperator::EqualsIgnoreCase
        ) && !a.negated
            && a.operand.known_value().is_some()
    })?;
    Some((
        BarrierVerdict::Effective,
        format!(
            "{} bounds `{}` to the known constant {}",
            atom, input.subject, atom.operand
        ),
    ))
}

fn inverted_encoding_gate(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    input.ops().encoding_seen.then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "branch is reached only when `{}` still contains '%', encoded input proceeds to the sink",
                input.subject
            ),
        )
    })
}

fn normalize_before_decode(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    (input.ops().normalized_before_decode && input.has_path_check()).then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "`{}` was normalized before decoding, encoded traversal (%2e%2e) survives {}",
                input.subject,
                input.describe_checks()
            ),
        )
    })
}

fn single_decode(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    (input.ops().decode == DecodeLevel::Once && input.has_path_check()).then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "`{}` was decoded a single time, double encoding bypasses {}",
                input.subject,
                input.describe_checks()
            ),
        )
    })
}

fn undecoded_check(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    (input.ops().decode == DecodeLevel::Raw && input.has_path_check()).then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "`{}` is checked without decoding, encoded input (/%57EB-INF, %2e%2e) bypasses {}",
                input.subject,
                input.describe_checks()
            ),
        )
    })
}

/// `startsWith` atom whose literal changes under canonicalization
fn is_non_canonical_prefix(atom: &GuardAtom) -> bool {
    let (GuardOperator::StartsWith, Some(literal)) = (atom.operator, atom.operand.known_value())
    else {
        return false;
    };
    canonicalize(literal).changed
}

fn non_canonical_literal(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    let backed = |atom: &GuardAtom| {
        if atom.negated {
            input.value.has_deny_prefix()
        } else {
            input.value.has_allow_prefix()
        }
    };
    let atom = input
        .atoms
        .iter()
        .find(|&a| is_non_canonical_prefix(a) && !backed(a))?;
    Some((
        BarrierVerdict::Ineffective,
        format!(
            "{} compares against an encoded literal that can never match a decoded value",
            atom
        ),
    ))
}

fn case_sensitive_deny_list(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    // allow lists hold under case-insensitive dispatch
    let applies = input.options.case_insensitive_dispatch
        && input.value.has_deny_prefix()
        && !input.value.has_allow_prefix()
        && !input.ops().case_folded;
    applies.then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "deny list on `{}` is case-sensitive but dispatch is not",
                input.subject
            ),
        )
    })
}

fn canonical_allow_list(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    if input.ops().decode != DecodeLevel::Canonical || !input.value.has_allow_prefix() {
        return None;
    }
    let confined = input.value.has_check(&Check::NoTraversal) || input.ops().normalized;
    Some(if confined {
        (
            BarrierVerdict::Effective,
            format!(
                "fully decoded `{}` passes {}",
                input.subject,
                input.describe_checks()
            ),
        )
    } else {
        (
            BarrierVerdict::Partial,
            format!(
                "allow-list prefix on decoded `{}` without a traversal check (/pages/../WEB-INF)",
                input.subject
            ),
        )
    })
}

fn canonical_deny_list(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    if input.ops().decode != DecodeLevel::Canonical {
        return None;
    }
    let deny = input.value.has_deny_prefix();
    let no_traversal = input.value.has_check(&Check::NoTraversal);
    match (deny, no_traversal) {
        (true, true) => Some((
            BarrierVerdict::Effective,
            format!(
                "fully decoded `{}` passes {}",
                input.subject,
                input.describe_checks()
            ),
        )),
        (true, false) => Some((
            BarrierVerdict::Partial,
            format!(
                "deny list on decoded `{}` without a traversal check",
                input.subject
            ),
        )),
        (false, true) => Some((
            BarrierVerdict::Partial,
            format!(
                "traversal check on decoded `{}` without an allow or deny list",
                input.subject
            ),
        )),
        (false, false) => None,
    }
}

fn encoding_gate(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    input.value.has_check(&Check::NoEncoding).then(|| {
        (
            BarrierVerdict::Partial,
            format!(
                "`{}` is free of encoding markers but not yet checked against an allow or deny list",
                input.subject
            ),
        )
    })
}

fn malformed_guard(input: &BarrierInput<'_>) -> Option<RuleOutcome> {
    (input.atoms.is_empty() && input.guard.is_opaque_for(input.subject)).then(|| {
        (
            BarrierVerdict::Ineffective,
            format!(
                "`{}` does not decompose into recognized checks on `{}`",
                input.guard.text, input.subject
            ),
        )
    })
}

/// Evaluator function of a built-in rule
pub fn rule_fn(rule: BarrierRule) -> Option<RuleFn> {
    let f: RuleFn = match rule {
        BarrierRule::ExactLiteralMatch => exact_literal_match,
        BarrierRule::InvertedEncodingGate => inverted_encoding_gate,
        BarrierRule::NormalizeBeforeDecode => normalize_before_decode,
        BarrierRule::SingleDecode => single_decode,
        BarrierRule::UndecodedCheck => undecoded_check,
        BarrierRule::NonCanonicalLiteral => non_canonical_literal,
        BarrierRule::CaseSensitiveDenyList => case_sensitive_deny_list,
        BarrierRule::CanonicalAllowList => canonical_allow_list,
        BarrierRule::CanonicalDenyList => canonical_deny_list,
        BarrierRule::EncodingGate => encoding_gate,
        BarrierRule::MalformedGuard => malformed_guard,
        BarrierRule::NoApplicableRule => return None,
    };
    Some(f)
}

// ============================================================================
// Guard application
// ============================================================================

/// Add the checks of `atoms` to `value` (GUARD node transfer, before evaluation).
/// A non-canonical prefix literal never matches a decoded value and adds no check.
pub fn apply_atoms(value: &TaintValue, atoms: &[GuardAtom]) -> TaintValue {
    let mut out = value.clone();
    for atom in atoms {
        let known = atom.operand.known_value();
        match (atom.operator, atom.negated, known) {
            (GuardOperator::StartsWith, false, Some(lit)) => {
                if let (prefix, true) = allow_prefix_key(lit) {
                    out.checks.insert(Check::AllowPrefix { prefix });
                }
            }
            (GuardOperator::StartsWith, true, Some(lit)) => {
                if let (prefix, true) = deny_prefix_key(lit) {
                    out.checks.insert(Check::DenyPrefix { prefix });
                }
            }
            (GuardOperator::Contains, true, Some(s)) if s.contains("..") => {
                out.checks.insert(Check::NoTraversal);
            }
            (GuardOperator::Contains, true, Some("%")) => {
                out.checks.insert(Check::NoEncoding);
                out.ops.decode = DecodeLevel::Canonical;
                out.ops.encoding_seen = false;
            }
            (GuardOperator::Contains, false, Some("%")) => {
                out.ops.encoding_seen = true;
            }
            (GuardOperator::Equals, false, Some(v)) => {
                out.checks.insert(Check::ExactMatch {
                    value: v.to_string(),
                });
            }
            (GuardOperator::EqualsIgnoreCase, false, Some(v)) => {
                out.checks.insert(Check::ExactMatch {
                    value: v.to_lowercase(),
                });
            }
            _ => {}
        }
    }
    out
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct RegisteredRule {
    rule: BarrierRule,
    check: RuleFn,
}

/// Rule registry keyed by (operator, decode context)
#[derive(Debug, Clone)]
pub struct BarrierEvaluator {
    table: FxHashMap<(CheckOperator, DecodeContext), Vec<RegisteredRule>>,
    options: BarrierOptions,
}

impl BarrierEvaluator {
    /// Empty registry
    pub fn empty(options: BarrierOptions) -> Self {
        Self {
            table: FxHashMap::default(),
            options,
        }
    }

    /// Registry with the built-in URL-forward rules
    pub fn new(options: BarrierOptions) -> Self {
        use DecodeContext::*;
        use GuardOperator::*;

        let op = CheckOperator::Check;
        let path_ops = [op(StartsWith), op(Contains)];
        let equality_ops = [op(Equals), op(EqualsIgnoreCase)];
        let string_ops = [
            op(StartsWith),
            op(Contains),
            op(Equals),
            op(EqualsIgnoreCase),
        ];
        let not_canonical = [Raw, Once, NormalizedRaw];

        let mut evaluator = Self::empty(options);
        evaluator.register_all(BarrierRule::ExactLiteralMatch, &equality_ops, &DecodeContext::ALL);
        evaluator.register_all(BarrierRule::InvertedEncodingGate, &string_ops, &not_canonical);
        evaluator.register_all(BarrierRule::NormalizeBeforeDecode, &path_ops, &[NormalizedRaw]);
        evaluator.register_all(BarrierRule::SingleDecode, &path_ops, &[Once]);
        evaluator.register_all(BarrierRule::UndecodedCheck, &path_ops, &[Raw]);
        evaluator.register_all(BarrierRule::NonCanonicalLiteral, &path_ops, &DecodeContext::ALL);
        evaluator.register_all(BarrierRule::CaseSensitiveDenyList, &path_ops, &[Canonical]);
        evaluator.register_all(BarrierRule::CanonicalAllowList, &path_ops, &[Canonical]);
        evaluator.register_all(BarrierRule::CanonicalDenyList, &path_ops, &[Canonical]);
        evaluator.register_all(BarrierRule::EncodingGate, &[op(Contains)], &[Canonical]);
        evaluator.register_all(BarrierRule::MalformedGuard, &[CheckOperator::Opaque], &DecodeContext::ALL);
        evaluator
    }

    pub fn options(&self) -> BarrierOptions {
        self.options
    }

    /// Register `check` under `rule` for one key
    pub fn register(
        &mut self,
        operator: CheckOperator,
        context: DecodeContext,
        rule: BarrierRule,
        check: RuleFn,
    ) {
        let rules = self.table.entry((operator, context)).or_default();
        if !rules.iter().any(|r| r.rule == rule) {
            rules.push(RegisteredRule { rule, check });
            rules.sort_by_key(|r| r.rule.priority());
        }
    }

    fn register_all(&mut self, rule: BarrierRule, operators: &[CheckOperator], contexts: &[DecodeContext]) {
        let Some(check) = rule_fn(rule) else {
            return;
        };
        for &op in operators {
            for &ctx in contexts {
                self.register(op, ctx, rule, check);
            }
        }
    }

    /// Rules that run for a guard with these atoms on a value in `context`
    pub fn candidate_rules(&self, atoms: &[GuardAtom], context: DecodeContext) -> Vec<BarrierRule> {
        self.candidates(atoms, context).iter().map(|r| r.rule).collect()
    }

    fn candidates(&self, atoms: &[GuardAtom], context: DecodeContext) -> Vec<RegisteredRule> {
        let mut operators: Vec<CheckOperator> = atoms
            .iter()
            .map(|a| CheckOperator::Check(a.operator))
            .collect();
        if operators.is_empty() {
            operators.push(CheckOperator::Opaque);
        }

        let mut rules: Vec<RegisteredRule> = Vec::new();
        for op in operators {
            for r in self.table.get(&(op, context)).into_iter().flatten() {
                if !rules.iter().any(|known| known.rule == r.rule) {
                    rules.push(*r);
                }
            }
        }
        rules.sort_by_key(|r| r.rule.priority());
        rules
    }

    /// Evaluate one guard against the value it refines (atoms already applied)
    pub fn evaluate(
        &self,
        guard: &GuardCondition,
        branch: bool,
        subject: &str,
        atoms: &[GuardAtom],
        value: &TaintValue,
    ) -> BarrierEvaluation {
        let input = BarrierInput {
            guard,
            branch,
            subject,
            atoms,
            value,
            options: self.options,
        };
        let context = DecodeContext::of(&value.ops);

        for registered in self.candidates(atoms, context) {
            if let Some((verdict, rationale)) = (registered.check)(&input) {
                return BarrierEvaluation::new(verdict, registered.rule, rationale);
            }
        }

        BarrierEvaluation::new(
            BarrierVerdict::Ineffective,
            BarrierRule::NoApplicableRule,
            format!("no barrier rule applies to `{}` on `{}`", guard.text, subject),
        )
    }
}

impl Default for BarrierEvaluator {
    fn default() -> Self {
        Self::new(BarrierOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::taint_analysis::domain::{GuardId, GuardOperand};
    use crate::shared::models::Span;

    fn lit(v: &str) -> GuardOperand {
        GuardOperand::Literal { value: v.into() }
    }

    fn starts_with(v: &str) -> GuardAtom {
        GuardAtom::new("path", GuardOperator::StartsWith, lit(v))
    }

    fn contains(v: &str) -> GuardAtom {
        GuardAtom::new("path", GuardOperator::Contains, lit(v))
    }

    fn guard(atoms: &[GuardAtom]) -> GuardCondition {
        let mut g = GuardCondition::new(GuardId(0), "test", Span::zero());
        g.on_true = atoms.to_vec();
        g
    }

    fn value(decode: DecodeLevel) -> TaintValue {
        let mut v = TaintValue::tainted();
        v.ops.decode = decode;
        v
    }

    fn eval_with(evaluator: &BarrierEvaluator, atoms: &[GuardAtom], incoming: &TaintValue) -> BarrierEvaluation {
        let g = guard(atoms);
        let refined = apply_atoms(incoming, atoms);
        evaluator.evaluate(&g, true, "path", atoms, &refined)
    }

    fn eval(atoms: &[GuardAtom], incoming: &TaintValue) -> BarrierEvaluation {
        eval_with(&BarrierEvaluator::default(), atoms, incoming)
    }

    fn deny_and_no_traversal() -> Vec<GuardAtom> {
        vec![starts_with("/WEB-INF/").negated(true), contains("..").negated(true)]
    }

    #[test]
    fn test_exact_literal_match_is_effective_regardless_of_encoding() {
        let atoms = [GuardAtom::new("path", GuardOperator::Equals, lit("/comaction"))];
        let e = eval(&atoms, &value(DecodeLevel::Raw));
        assert_eq!(e.verdict, BarrierVerdict::Effective);
        assert_eq!(e.rule, BarrierRule::ExactLiteralMatch);
    }

    #[test]
    fn test_equals_variable_is_not_a_constant() {
        let atoms = [GuardAtom::new(
            "path",
            GuardOperator::Equals,
            GuardOperand::Variable { name: "other".into() },
        )];
        let e = eval(&atoms, &value(DecodeLevel::Raw));
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
        assert_eq!(e.rule, BarrierRule::NoApplicableRule);
    }

    #[test]
    fn test_undecoded_prefix_check() {
        let e = eval(&[starts_with("/pages")], &value(DecodeLevel::Raw));
        assert_eq!(e.rule, BarrierRule::UndecodedCheck);
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
    }

    #[test]
    fn test_single_decode() {
        let e = eval(&deny_and_no_traversal(), &value(DecodeLevel::Once));
        assert_eq!(e.rule, BarrierRule::SingleDecode);
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
    }

    #[test]
    fn test_normalize_before_decode() {
        let mut v = value(DecodeLevel::Raw);
        v.ops.normalized_before_decode = true;
        let e = eval(&[starts_with("/pages")], &v);
        assert_eq!(e.rule, BarrierRule::NormalizeBeforeDecode);
    }

    #[test]
    fn test_canonical_deny_list_with_traversal_check_is_effective() {
        let e = eval(&deny_and_no_traversal(), &value(DecodeLevel::Canonical));
        assert_eq!(e.verdict, BarrierVerdict::Effective);
        assert_eq!(e.rule, BarrierRule::CanonicalDenyList);

        let partial = eval(&[starts_with("/WEB-INF/").negated(true)], &value(DecodeLevel::Canonical));
        assert_eq!(partial.verdict, BarrierVerdict::Partial);
    }

    #[test]
    fn test_canonical_allow_list() {
        let only_prefix = eval(&[starts_with("/pages")], &value(DecodeLevel::Canonical));
        assert_eq!(only_prefix.verdict, BarrierVerdict::Partial);
        assert_eq!(only_prefix.rule, BarrierRule::CanonicalAllowList);

        let confined = eval(
            &[starts_with("/pages"), contains("..").negated(true)],
            &value(DecodeLevel::Canonical),
        );
        assert_eq!(confined.verdict, BarrierVerdict::Effective);

        let mut normalized = value(DecodeLevel::Canonical);
        normalized.ops.normalized = true;
        let e = eval(&[starts_with("/pages")], &normalized);
        assert_eq!(e.verdict, BarrierVerdict::Effective);
    }

    #[test]
    fn test_encoding_gate_alone_is_partial_and_upgrades_deny_list() {
        let gate = [contains("%").negated(true)];
        let alone = eval(&gate, &value(DecodeLevel::Raw));
        assert_eq!(alone.verdict, BarrierVerdict::Partial);
        assert_eq!(alone.rule, BarrierRule::EncodingGate);

        // deny list checked first on the raw value, encoding gate afterwards
        let checked = apply_atoms(&value(DecodeLevel::Raw), &deny_and_no_traversal());
        let after_gate = eval(&gate, &checked);
        assert_eq!(after_gate.verdict, BarrierVerdict::Effective);
        assert_eq!(after_gate.rule, BarrierRule::CanonicalDenyList);
    }

    #[test]
    fn test_inverted_encoding_gate() {
        let gated = apply_atoms(&value(DecodeLevel::Raw), &[contains("%")]);
        let e = eval(&deny_and_no_traversal(), &gated);
        assert_eq!(e.rule, BarrierRule::InvertedEncodingGate);
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
    }

    #[test]
    fn test_non_canonical_literal() {
        let mut v = value(DecodeLevel::Canonical);
        v.checks.insert(Check::NoTraversal);
        let e = eval(&[starts_with("/%57EB-INF").negated(true)], &v);
        assert_eq!(e.rule, BarrierRule::NonCanonicalLiteral);
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
    }

    #[test]
    fn test_non_canonical_literal_next_to_canonical_deny_list() {
        let mut atoms = deny_and_no_traversal();
        atoms.push(starts_with("/%57EB-INF").negated(true));

        let refined = apply_atoms(&value(DecodeLevel::Canonical), &atoms);
        assert_eq!(refined.checks.len(), 2);

        let e = eval(&atoms, &value(DecodeLevel::Canonical));
        assert_eq!(e.rule, BarrierRule::CanonicalDenyList);
        assert_eq!(e.verdict, BarrierVerdict::Effective);
    }

    #[test]
    fn test_more_checks_never_less_effective() {
        let extra = [
            Check::DenyPrefix {
                prefix: "/web-inf/".into(),
            },
            Check::AllowPrefix {
                prefix: "/pages".into(),
            },
            Check::NoTraversal,
        ];
        let guards: Vec<Vec<GuardAtom>> = vec![
            vec![starts_with("/%57EB-INF").negated(true)],
            vec![starts_with("/%70ages")],
            vec![starts_with("/WEB-INF/").negated(true)],
            vec![contains("..").negated(true)],
            deny_and_no_traversal(),
        ];

        for case_insensitive_dispatch in [false, true] {
            let evaluator = BarrierEvaluator::new(BarrierOptions {
                case_insensitive_dispatch,
            });
            for atoms in &guards {
                let effective_with = |mask: usize| {
                    let mut v = value(DecodeLevel::Canonical);
                    for (i, c) in extra.iter().enumerate() {
                        if mask & (1 << i) != 0 {
                            v.checks.insert(c.clone());
                        }
                    }
                    eval_with(&evaluator, atoms, &v).verdict.is_effective()
                };
                for fewer in 0..8usize {
                    for more in 0..8usize {
                        if fewer & more == fewer {
                            assert!(
                                effective_with(fewer) <= effective_with(more),
                                "checks {:03b} effective but {:03b} not, for {:?}",
                                fewer,
                                more,
                                atoms
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_case_sensitive_deny_list_only_with_option() {
        let evaluator = BarrierEvaluator::new(BarrierOptions {
            case_insensitive_dispatch: true,
        });
        let e = eval_with(&evaluator, &deny_and_no_traversal(), &value(DecodeLevel::Canonical));
        assert_eq!(e.rule, BarrierRule::CaseSensitiveDenyList);

        let mut folded = value(DecodeLevel::Canonical);
        folded.ops.case_folded = true;
        let e = eval_with(&evaluator, &deny_and_no_traversal(), &folded);
        assert_eq!(e.verdict, BarrierVerdict::Effective);
    }

    #[test]
    fn test_malformed_guard() {
        let mut g = GuardCondition::new(GuardId(0), "isSafe(path)", Span::zero());
        g.opaque_subjects.push("path".into());
        let e = BarrierEvaluator::default().evaluate(&g, true, "path", &[], &value(DecodeLevel::Raw));
        assert_eq!(e.rule, BarrierRule::MalformedGuard);
        assert_eq!(e.verdict, BarrierVerdict::Ineffective);
    }

    #[test]
    fn test_candidates_follow_priority() {
        let evaluator = BarrierEvaluator::default();
        let rules = evaluator.candidate_rules(&deny_and_no_traversal(), DecodeContext::Canonical);
        let priorities: Vec<u8> = rules.iter().map(|r| r.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert!(rules.contains(&BarrierRule::CanonicalDenyList));
        assert!(!rules.contains(&BarrierRule::UndecodedCheck));
    }

    #[test]
    fn test_decode_context() {
        let mut ops = PrecedingOps::default();
        assert_eq!(DecodeContext::of(&ops), DecodeContext::Raw);
        ops.normalized_before_decode = true;
        assert_eq!(DecodeContext::of(&ops), DecodeContext::NormalizedRaw);
        ops.decode = DecodeLevel::Canonical;
        assert_eq!(DecodeContext::of(&ops), DecodeContext::Canonical);
    }
}
