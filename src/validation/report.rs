//! Plain-text validation report.

use std::fmt::Write;

use super::{ValidationIssue, ValidationResult};

/// Renders errors first, then warnings, then a one-line tally.
pub fn format_report(result: &ValidationResult) -> String {
    if result.is_empty() {
        return "Client options are valid.".to_string();
    }

    let mut report = String::new();
    for issue in result.errors().chain(result.warnings()) {
        write_issue(&mut report, issue);
    }

    let errors = result.error_count();
    let _ = writeln!(
        report,
        "{} error(s), {} warning(s){}",
        errors,
        result.warnings().count(),
        if errors > 0 { ", options rejected" } else { "" }
    );

    report
}

fn write_issue(report: &mut String, issue: &ValidationIssue) {
    let _ = writeln!(report, "{:<7} {}: {}", issue.severity.label(), issue.key, issue.message);
    if let Some(suggestion) = &issue.suggestion {
        let _ = writeln!(report, "        hint: {}", suggestion);
    }
}
