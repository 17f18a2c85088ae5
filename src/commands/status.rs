//! Implementation of the `pgit status` and `pgit private-status` commands.
//!
//! `status` shows the main repository and whether every tracked path still
//! has a working link into private storage. `private-status` shows the
//! private repository on its own.

use super::{Report, open_config, private_repository};
use crate::context::ProjectContext;
use crate::error::Result;
use crate::git::{GitStatus, RepositoryPair};
use crate::platform::Capabilities;
use crate::symlink::{SymlinkIssue, SymlinkManager};
use serde::Serialize;
use std::path::PathBuf;

/// Link health of one tracked path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLink {
    pub path: String,
    /// Link text currently stored at the path.
    pub link_target: Option<PathBuf>,
    /// Link text pgit creates for the path.
    pub expected_target: PathBuf,
    pub healthy: bool,
    pub issues: Vec<SymlinkIssue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub main: GitStatus,
    pub tracked: Vec<TrackedLink>,
    /// Filled only when `autoCleanup` is enabled.
    pub warnings: Vec<String>,
}

impl Report for StatusReport {
    fn message(&self) -> String {
        let mut lines = vec![branch_line("Main repository", &self.main)];
        lines.extend(summarize(&self.main));
        lines.push(String::new());

        if self.tracked.is_empty() {
            lines.push("No privately tracked paths. Track one with `pgit add <path>`.".to_string());
        } else {
            lines.push(format!("Tracked privately ({}):", self.tracked.len()));
            for link in &self.tracked {
                if link.healthy {
                    lines.push(format!("  ok      {}", link.path));
                } else {
                    let issues: Vec<String> = link.issues.iter().map(issue_label).collect();
                    let detail = if issues.is_empty() {
                        "points elsewhere".to_string()
                    } else {
                        issues.join(", ")
                    };
                    lines.push(format!("  broken  {} ({})", link.path, detail));
                }
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            for warning in &self.warnings {
                lines.push(format!("Warning: {}", warning));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateStatusReport {
    pub status: GitStatus,
}

impl Report for PrivateStatusReport {
    fn message(&self) -> String {
        let mut lines = vec![branch_line("Private storage", &self.status)];
        lines.extend(summarize(&self.status));
        for file in &self.status.files {
            lines.push(format!("  {}{} {}", file.index, file.working_dir, file.path));
        }
        lines.join("\n")
    }
}

pub fn status(ctx: &ProjectContext, capabilities: &Capabilities) -> Result<StatusReport> {
    let (_store, config) = open_config(ctx)?;
    let pair = RepositoryPair::new(ctx);
    let symlinks = SymlinkManager::new(capabilities);

    let main = pair.main.status()?;
    let tracked: Vec<TrackedLink> = config
        .tracked_paths
        .iter()
        .map(|rel| {
            let link = pair.working_path_for(rel);
            let info = symlinks.validate(&link);
            let healthy = info.is_healthy() && symlinks.points_to(&link, &pair.storage_path_for(rel));
            TrackedLink {
                path: rel.clone(),
                link_target: info.link_target,
                expected_target: pair.link_target_for(rel),
                healthy,
                issues: info.issues,
            }
        })
        .collect();

    let warnings = if config.settings.auto_cleanup {
        tracked
            .iter()
            .filter(|link| !link.healthy)
            .map(|link| format!("link for '{}' is broken; run `pgit cleanup`", link.path))
            .collect()
    } else {
        Vec::new()
    };

    Ok(StatusReport {
        main,
        tracked,
        warnings,
    })
}

pub fn private_status(ctx: &ProjectContext) -> Result<PrivateStatusReport> {
    let (private, _config) = private_repository(ctx)?;
    Ok(PrivateStatusReport {
        status: private.status()?,
    })
}

fn branch_line(label: &str, status: &GitStatus) -> String {
    let branch = status.current.as_deref().unwrap_or("(detached HEAD)");
    match &status.tracking {
        Some(upstream) => format!(
            "{} on branch {} (tracking {}, ahead {}, behind {})",
            label, branch, upstream, status.ahead, status.behind
        ),
        None => format!("{} on branch {}", label, branch),
    }
}

fn summarize(status: &GitStatus) -> Vec<String> {
    if status.is_clean() {
        return vec!["  working tree clean".to_string()];
    }
    vec![format!(
        "  staged: {}, modified: {}, deleted: {}, untracked: {}",
        status.staged.len(),
        status.modified.len(),
        status.deleted.len(),
        status.untracked.len()
    )]
}

fn issue_label(issue: &SymlinkIssue) -> String {
    match issue {
        SymlinkIssue::Missing => "missing".to_string(),
        SymlinkIssue::NotASymlink => "not a symlink".to_string(),
        SymlinkIssue::DanglingTarget => "target missing".to_string(),
    }
}
