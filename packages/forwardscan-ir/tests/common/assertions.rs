//! Custom assertions for test verification
//!
//! Domain-specific checks over `AnalysisReport`.

use forwardscan_ir::features::taint_analysis::{FindingDTO, ProcedureReport};
use forwardscan_ir::{AnalysisReport, Verdict};

fn procedure<'a>(report: &'a AnalysisReport, name: &str) -> &'a ProcedureReport {
    report.procedure(name).unwrap_or_else(|| {
        panic!(
            "No procedure '{name}' in report. Procedures: {:?}",
            report.procedures.iter().map(|p| &p.name).collect::<Vec<_>>()
        )
    })
}

fn describe(findings: &[FindingDTO]) -> Vec<String> {
    findings
        .iter()
        .map(|f| format!("{:?} {} -> {}", f.verdict, f.source.text, f.sink.text))
        .collect()
}

/// Assert that every procedure ran to completion
pub fn assert_all_complete(report: &AnalysisReport) {
    let incomplete: Vec<_> = report
        .procedures
        .iter()
        .filter(|p| !p.status.is_complete())
        .map(|p| (&p.name, &p.status))
        .collect();
    assert!(incomplete.is_empty(), "Expected all procedures complete, got: {incomplete:?}");
}

/// Assert that a procedure has exactly `expected` FLAGGED findings
pub fn assert_flagged_count(report: &AnalysisReport, name: &str, expected: usize) {
    let p = procedure(report, name);
    let flagged = p.findings.iter().filter(|f| f.is_flagged()).count();
    assert_eq!(
        flagged,
        expected,
        "Expected {expected} flagged findings in '{name}', got {flagged}. Findings: {:?}",
        describe(&p.findings)
    );
}

/// Assert that a procedure has no FLAGGED finding
pub fn assert_not_flagged(report: &AnalysisReport, name: &str) {
    assert_flagged_count(report, name, 0);
}

/// Assert that a procedure has a SUPPRESSED finding justified by `rule`
pub fn assert_suppressed_by(report: &AnalysisReport, name: &str, rule: &str) {
    let p = procedure(report, name);
    let found = p
        .findings
        .iter()
        .filter(|f| f.verdict == Verdict::SuppressedByBarrier)
        .any(|f| f.barriers.iter().any(|b| b.rule == rule && b.verdict == "EFFECTIVE"));
    assert!(
        found,
        "Expected '{name}' to be suppressed by {rule}. Findings: {:?}",
        p.findings
            .iter()
            .map(|f| (f.verdict, f.barriers.iter().map(|b| &b.rule).collect::<Vec<_>>()))
            .collect::<Vec<_>>()
    );
}

/// Assert that every finding's path starts at its source and ends at its sink
pub fn assert_paths_well_formed(report: &AnalysisReport) {
    for f in &report.findings {
        assert_eq!(f.path.first(), Some(&f.source), "path of {:?} must start at the source", f.sink);
        assert_eq!(f.path.last(), Some(&f.sink), "path of {:?} must end at the sink", f.sink);
        assert_eq!(f.path_length, f.path.len());
        assert_eq!(f.cwe, "CWE-552");
    }
}
