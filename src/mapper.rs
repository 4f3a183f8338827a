//! Translation of a structured review into a GitHub pull request review.

use crate::github::{ReviewComment, ReviewDecision};
use crate::review::{Finding, OverallSeverity, Severity};

pub fn severity_to_decision(overall: OverallSeverity) -> ReviewDecision {
    match overall {
        OverallSeverity::Clean => ReviewDecision::Approve,
        OverallSeverity::Critical | OverallSeverity::Warning => ReviewDecision::RequestChanges,
        OverallSeverity::Info => ReviewDecision::Comment,
    }
}

/// Inline comments for every finding with a file path and a line range, anchored
/// on the last line of the range. Findings without a location only appear in the
/// review summary.
pub fn findings_to_comments(findings: &[Finding]) -> Vec<ReviewComment> {
    findings
        .iter()
        .filter(|f| !f.file_path.is_empty())
        .filter_map(|f| {
            f.line_range.map(|range| ReviewComment {
                path: f.file_path.clone(),
                line: range.end,
                body: comment_body(f),
            })
        })
        .collect()
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::Warning => "🟡",
        Severity::Info => "🔵",
    }
}

fn comment_body(finding: &Finding) -> String {
    let mut body = format!(
        "{} **{}**: {}\n\n{}",
        severity_marker(finding.severity),
        finding.severity.as_str().to_uppercase(),
        finding.title,
        finding.description
    );

    if let Some(suggestion) = finding.suggestion.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&format!("\n\n**Suggestion:** {suggestion}"));
    }
    if let Some(code) = finding.code_suggestion.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&format!("\n\n```suggestion\n{code}\n```"));
    }
    body
}
