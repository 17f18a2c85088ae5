//! Rendering of the cleanup report.

use super::{CleanupReport, IssueSeverity};

/// Human-readable report, one numbered entry per issue.
pub fn render_report(report: &CleanupReport) -> String {
    if !report.has_issues() {
        return "Everything is consistent. No issues detected.".to_string();
    }

    let mut lines = Vec::new();

    let open: Vec<_> = report.issues.iter().filter(|i| !i.repaired).collect();
    if !open.is_empty() {
        lines.push(format!("Issues detected ({}):", open.len()));
        lines.push(String::new());

        for (i, issue) in open.iter().enumerate() {
            lines.push(format!(
                "  {}. [{}] {} - {}",
                i + 1,
                issue.severity,
                issue.category,
                issue.description
            ));
            if let Some(path) = &issue.path {
                lines.push(format!("     Path: {}", path));
            }
            if let Some(remediation) = &issue.remediation {
                lines.push(format!("     Fix:  {}", remediation));
            }
        }
        lines.push(String::new());
    }

    if !report.repairs.is_empty() {
        lines.push(format!("Repairs applied ({}):", report.repairs.len()));
        for repair in &report.repairs {
            lines.push(format!("  - {}", repair));
        }
        lines.push(String::new());
    }

    let errors = report.remaining_errors();
    let warnings = open
        .iter()
        .filter(|i| i.severity == IssueSeverity::Warning)
        .count();
    lines.push(if open.is_empty() {
        format!("Summary: all {} issue(s) repaired.", report.repairs.len())
    } else {
        format!(
            "Summary: {} issue(s) remain ({} errors, {} warnings).",
            open.len(),
            errors,
            warnings
        )
    });

    lines.join("\n")
}
