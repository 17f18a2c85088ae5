//! Implementation of the `pgit cleanup` command.
//!
//! Detects inconsistencies between the working tree, the two repositories
//! and the configuration, and repairs the safe ones.
//!
//! # Checks
//!
//! - Configuration health and layout (reported, never rewritten). When the
//!   record cannot be loaded, the checks that need tracked paths are skipped
//!   and the rest still run.
//! - Missing backups directory (recreated)
//! - Tracked links that are missing, dangling or point elsewhere (relinked
//!   when the stored content exists)
//! - Tracked paths leaked back into the main index (removed with `--force`)
//! - Required `.gitignore` entries and, with `autoGitignore`, `info/exclude`
//!   entries for tracked paths (appended)
//! - Backup artifacts left by interrupted runs (deleted)
//! - Health of both repositories (reported)
//!
//! Running cleanup twice without changes in between repairs nothing the
//! second time.

mod checks;
mod display;


use super::{Report, open_config};
use crate::config::ConfigStore;
use crate::context::ProjectContext;
use crate::error::Result;
use crate::events::{self, Event, EventAction};
use crate::git::RepositoryPair;
use crate::platform::Capabilities;
use crate::symlink::SymlinkManager;
use serde::Serialize;
use serde_json::json;

use checks::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    /// Remove leaked tracked paths from the main index.
    pub force: bool,
}

/// Severity level for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Potential problem, or one that was repaired.
    Warning,
    /// Something is wrong and stays wrong after this run.
    Error,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Warning => write!(f, "WARNING"),
            IssueSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// A detected issue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: String,
    pub description: String,
    /// Path or identifier involved.
    pub path: Option<String>,
    /// What the user can do about it.
    pub remediation: Option<String>,
    /// Whether this run fixed it.
    pub repaired: bool,
}

impl Issue {
    pub fn new(severity: IssueSeverity, category: &str, description: &str) -> Self {
        Self {
            severity,
            category: category.to_string(),
            description: description.to_string(),
            path: None,
            remediation: None,
            repaired: false,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }

    pub fn repaired(mut self) -> Self {
        self.repaired = true;
        self
    }
}

/// Result of a cleanup run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub issues: Vec<Issue>,
    /// Repairs performed, one line each.
    pub repairs: Vec<String>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Error-severity issues this run could not fix.
    pub fn remaining_errors(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error && !i.repaired)
            .count()
    }

    fn record_repair(&mut self, issue: Issue, repair: String) {
        self.issues.push(issue.repaired());
        self.repairs.push(repair);
    }
}

impl Report for CleanupReport {
    fn message(&self) -> String {
        display::render_report(self)
    }

    fn success(&self) -> bool {
        self.remaining_errors() == 0
    }
}

pub fn run(ctx: &ProjectContext, capabilities: &Capabilities, options: &CleanupOptions) -> Result<CleanupReport> {
    ctx.ensure_initialized()?;
    let mut report = CleanupReport::new();

    let pair = RepositoryPair::new(ctx);
    let symlinks = SymlinkManager::new(capabilities);

    // Checks that read tracked paths are skipped when the record is unusable.
    let loaded = if check_config_health(&ConfigStore::new(ctx), &mut report) {
        let (store, config) = open_config(ctx)?;
        check_config_layout(&config, &mut report);
        Some((store, config))
    } else {
        None
    };

    check_backups_dir(ctx, &mut report)?;
    if let Some((_, config)) = &loaded {
        check_tracked_links(&pair, &symlinks, config, &mut report);
        check_index_leaks(&pair, config, options.force, &mut report)?;
    }
    check_gitignore(ctx, &mut report)?;
    if let Some((_, config)) = &loaded {
        check_exclude_entries(&pair, config, &mut report)?;
    }
    check_stale_backups(ctx, &mut report);
    check_repositories(&pair, &mut report);

    if let Some((mut store, _)) = loaded {
        store.record_cleanup()?;
    }
    events::record(
        ctx,
        Event::new(EventAction::Cleanup).with_details(json!({
            "issues": report.issues.len(),
            "repairs": report.repairs,
            "remainingErrors": report.remaining_errors(),
        })),
    );

    Ok(report)
}
