//! Result Reporter
//!
//! Pure transformation of findings into DTOs, JSON and a human-readable text
//! report. Writing the output is left to the caller.

use std::fmt::Write as _;

use crate::features::taint_analysis::domain::Finding;
use crate::features::taint_analysis::ports::{
    AnalysisReport, FindingDTO, PathStepDTO, ProcedureStatus,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultReporter {
    /// Keep barrier rule ids and rationales on suppressed findings
    explain: bool,
}

impl ResultReporter {
    pub fn new(explain: bool) -> Self {
        Self { explain }
    }

    pub fn finding_dtos(&self, findings: &[Finding]) -> Vec<FindingDTO> {
        findings
            .iter()
            .map(|f| {
                let mut dto = FindingDTO::from(f);
                if !self.explain {
                    dto.barriers.clear();
                }
                dto
            })
            .collect()
    }

    pub fn render_json(&self, report: &AnalysisReport) -> serde_json::Result<String> {
        serde_json::to_string_pretty(report)
    }

    pub fn render_text(&self, report: &AnalysisReport) -> String {
        let mut out = String::new();
        let stats = &report.stats;

        let _ = writeln!(out, "forwardscan: {}", report.unit);
        let _ = writeln!(
            out,
            "  procedures: {} ({} unstable, {} failed)",
            stats.procedures_analyzed, stats.procedures_unstable, stats.procedures_failed
        );
        let _ = writeln!(
            out,
            "  findings:   {} flagged, {} suppressed",
            stats.findings_flagged, stats.findings_suppressed
        );

        for procedure in &report.procedures {
            match &procedure.status {
                ProcedureStatus::Complete => {}
                ProcedureStatus::Unstable { reason } => {
                    let _ = writeln!(out, "\n[UNSTABLE] {}: {}", procedure.label(), reason);
                }
                ProcedureStatus::Failed { error } => {
                    let _ = writeln!(out, "\n[FAILED] {}: {}", procedure.label(), error);
                }
            }
        }

        for finding in &report.findings {
            out.push('\n');
            self.render_finding(&mut out, finding);
        }
        out
    }

    fn render_finding(&self, out: &mut String, f: &FindingDTO) {
        let label = if f.is_flagged() {
            "FLAGGED"
        } else {
            "SUPPRESSED"
        };
        let unstable = if f.unstable { " (unstable)" } else { "" };
        let _ = writeln!(
            out,
            "[{}]{} {} in {}: {} -> {}",
            label,
            unstable,
            f.cwe,
            f.procedure,
            short(&f.source),
            short(&f.sink)
        );

        let path: Vec<String> = f.path.iter().map(short).collect();
        let _ = writeln!(out, "    path: {}", path.join(" -> "));

        if self.explain {
            for b in &f.barriers {
                let branch = if b.branch { "true" } else { "false" };
                let _ = writeln!(
                    out,
                    "    barrier `{}` [{}] on {} @{}: {} {}: {}",
                    b.guard, branch, b.variable, b.location, b.rule, b.verdict, b.rationale
                );
            }
        }
    }
}

fn short(step: &PathStepDTO) -> String {
    format!("`{}` @{}", step.text, step.location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::taint_analysis::domain::{
        AppliedBarrier, BarrierEvaluation, BarrierRule, BarrierVerdict, GuardId, PathStep, Verdict,
    };
    use crate::features::taint_analysis::ports::{AnalysisStats, ProcedureReport};
    use crate::shared::models::Span;

    fn step(text: &str, line: u32) -> PathStep {
        PathStep {
            node: line as usize,
            kind: "VARIABLE_REF".into(),
            text: text.into(),
            span: Span::line(line),
        }
    }

    fn suppressed() -> Finding {
        Finding {
            procedure: "good1".into(),
            source: step("request.getParameter(\"p\")", 2),
            sink: step("request.getRequestDispatcher(p)", 4),
            path: vec![step("request.getParameter(\"p\")", 2), step("request.getRequestDispatcher(p)", 4)],
            verdict: Verdict::SuppressedByBarrier,
            barriers: vec![AppliedBarrier {
                guard: GuardId(0),
                branch: true,
                guard_text: "p.equals(\"/home\")".into(),
                span: Span::line(3),
                variable: "p".into(),
                evaluation: BarrierEvaluation::new(
                    BarrierVerdict::Effective,
                    BarrierRule::ExactLiteralMatch,
                    "bounded to a constant",
                ),
            }],
            unstable: false,
        }
    }

    fn report(reporter: &ResultReporter) -> AnalysisReport {
        let findings = reporter.finding_dtos(&[suppressed()]);
        AnalysisReport {
            unit: "Servlet".into(),
            procedures: vec![
                ProcedureReport {
                    name: "good1".into(),
                    signature: String::new(),
                    status: ProcedureStatus::Complete,
                    findings: findings.clone(),
                    nodes: 5,
                    guards: 1,
                },
                ProcedureReport {
                    name: "loop".into(),
                    signature: "loop(HttpServletRequest)".into(),
                    status: ProcedureStatus::Unstable {
                        reason: "iteration ceiling hit after 10 node visits".into(),
                    },
                    findings: vec![],
                    nodes: 9,
                    guards: 2,
                },
            ],
            findings,
            stats: AnalysisStats {
                procedures_analyzed: 2,
                procedures_unstable: 1,
                findings_suppressed: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_explain_keeps_barriers() {
        let reporter = ResultReporter::new(true);
        let text = reporter.render_text(&report(&reporter));
        assert!(text.contains("[SUPPRESSED] CWE-552 in good1"));
        assert!(text.contains("EXACT_LITERAL_MATCH EFFECTIVE: bounded to a constant"));
        assert!(text.contains("[UNSTABLE] loop(HttpServletRequest): iteration ceiling"));
    }

    #[test]
    fn test_without_explain_barriers_dropped() {
        let reporter = ResultReporter::new(false);
        let dtos = reporter.finding_dtos(&[suppressed()]);
        assert!(dtos[0].barriers.is_empty());
        let text = reporter.render_text(&report(&reporter));
        assert!(!text.contains("barrier"));
    }

    #[test]
    fn test_json_rendering() {
        let reporter = ResultReporter::new(true);
        let json = reporter.render_json(&report(&reporter)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["findings"][0]["verdict"], "SUPPRESSED_BY_BARRIER");
        assert_eq!(value["findings"][0]["barriers"][0]["rule"], "EXACT_LITERAL_MATCH");
        assert_eq!(value["procedures"][1]["status"], "UNSTABLE");
    }
}
