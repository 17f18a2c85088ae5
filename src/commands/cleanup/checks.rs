//! Consistency checks for the cleanup command.
//!
//! Each check appends to the report and repairs what it can without risking
//! user content.

use crate::commands::ignore::{append_missing_lines, exclude_entry};
use crate::config::{ConfigStore, PrivateConfig};
use crate::context::{DEFAULT_MARKER_DIR, DEFAULT_STORAGE_DIR, ProjectContext, REQUIRED_IGNORE_ENTRIES};
use crate::error::{PgitError, Result};
use crate::fs::{is_backup_artifact, remove_path};
use crate::git::RepositoryPair;
use crate::symlink::{SymlinkIssue, SymlinkManager};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{CleanupReport, Issue, IssueSeverity};

/// Diagnose the configuration record. Returns `false` when it cannot be used
/// for the remaining checks.
pub fn check_config_health(store: &ConfigStore, report: &mut CleanupReport) -> bool {
    let health = store.get_health();

    if health.needs_migration {
        let from = health.current_version.as_deref().unwrap_or("unknown");
        report.record_repair(
            Issue::new(
                IssueSeverity::Warning,
                "config_outdated",
                &format!(
                    "Configuration schema {} is older than {}",
                    from, health.expected_version
                ),
            )
            .with_path(&store.path().display().to_string()),
            format!(
                "Migrated configuration from {} to {}",
                from, health.expected_version
            ),
        );
        return true;
    }

    if health.errors.is_empty() {
        return true;
    }

    for error in &health.errors {
        report.issues.push(
            Issue::new(IssueSeverity::Error, "config_invalid", error)
                .with_path(&store.path().display().to_string())
                .with_remediation(
                    "Fix .private-config.json by hand or restore a copy from .git-private/backups",
                ),
        );
    }
    false
}

/// Warn about layout fields that differ from the fixed layout pgit uses.
pub fn check_config_layout(config: &PrivateConfig, report: &mut CleanupReport) {
    let fields = [
        ("storagePath", config.storage_path.as_str(), DEFAULT_STORAGE_DIR),
        ("privateRepoPath", config.private_repo_path.as_str(), DEFAULT_MARKER_DIR),
    ];

    for (field, actual, expected) in fields {
        if actual.trim_end_matches('/') != expected {
            report.issues.push(
                Issue::new(
                    IssueSeverity::Warning,
                    "config_layout",
                    &format!(
                        "{} is '{}' but pgit always uses '{}'",
                        field, actual, expected
                    ),
                )
                .with_remediation(&format!("Set {} back to \"{}\"", field, expected)),
            );
        }
    }
}

pub fn check_backups_dir(ctx: &ProjectContext, report: &mut CleanupReport) -> Result<()> {
    let dir = ctx.backups_dir();
    if dir.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(&dir).map_err(|e| {
        PgitError::from_io(e, format!("failed to create directory '{}'", dir.display()))
    })?;
    report.record_repair(
        Issue::new(
            IssueSeverity::Warning,
            "missing_directory",
            "Backups directory does not exist",
        )
        .with_path(&dir.display().to_string()),
        format!("Created {}", dir.display()),
    );
    Ok(())
}

/// Every tracked path must be a link resolving to its storage location.
pub fn check_tracked_links(
    pair: &RepositoryPair,
    symlinks: &SymlinkManager,
    config: &PrivateConfig,
    report: &mut CleanupReport,
) {
    for rel in &config.tracked_paths {
        let link = pair.working_path_for(rel);
        let stored = pair.storage_path_for(rel);
        let info = symlinks.validate(&link);

        if info.is_healthy() && symlinks.points_to(&link, &stored) {
            continue;
        }

        let description = describe_link_problem(&info.issues);

        if symlinks.is_repairable(&link, &stored) {
            match symlinks.repair(&link, &stored) {
                Ok(()) => {
                    debug!(path = %rel, "relinked tracked path");
                    report.record_repair(
                        Issue::new(IssueSeverity::Warning, "broken_link", &description)
                            .with_path(rel),
                        format!("Relinked {} -> {}", rel, pair.link_target_for(rel).display()),
                    );
                }
                Err(e) => {
                    warn!(path = %rel, error = %e, "link repair failed");
                    report.issues.push(
                        Issue::new(
                            IssueSeverity::Error,
                            "broken_link",
                            &format!("{}; repair failed: {}", description, e),
                        )
                        .with_path(rel),
                    );
                }
            }
            continue;
        }

        let remediation = if info.issues.contains(&SymlinkIssue::NotASymlink) {
            format!(
                "A regular file or directory occupies '{}'. Move it aside and run `pgit cleanup` again.",
                rel
            )
        } else {
            format!(
                "No stored content for '{}'. Check out a private revision that has it (`pgit checkout <branch>`).",
                rel
            )
        };
        report.issues.push(
            Issue::new(IssueSeverity::Error, "broken_link", &description)
                .with_path(rel)
                .with_remediation(&remediation),
        );
    }
}

fn describe_link_problem(issues: &[SymlinkIssue]) -> String {
    if issues.contains(&SymlinkIssue::Missing) {
        "Link is missing".to_string()
    } else if issues.contains(&SymlinkIssue::NotASymlink) {
        "Path is not a symbolic link".to_string()
    } else if issues.contains(&SymlinkIssue::DanglingTarget) {
        "Link target does not exist".to_string()
    } else {
        "Link points outside private storage".to_string()
    }
}

/// Tracked paths must not be in the main repository's index.
pub fn check_index_leaks(
    pair: &RepositoryPair,
    config: &PrivateConfig,
    force: bool,
    report: &mut CleanupReport,
) -> Result<()> {
    for rel in &config.tracked_paths {
        if !pair.main.is_tracked(rel)? {
            continue;
        }

        let issue = Issue::new(
            IssueSeverity::Warning,
            "index_leak",
            "Privately tracked path is staged in the main repository",
        )
        .with_path(rel);

        if force {
            pair.main.remove_from_index(&[rel.as_str()], true)?;
            report.record_repair(issue, format!("Removed {} from the main index", rel));
        } else {
            report
                .issues
                .push(issue.with_remediation("pgit cleanup --force"));
        }
    }
    Ok(())
}

pub fn check_gitignore(ctx: &ProjectContext, report: &mut CleanupReport) -> Result<()> {
    let gitignore = ctx.gitignore_path();
    for entry in append_missing_lines(&gitignore, REQUIRED_IGNORE_ENTRIES)? {
        report.record_repair(
            Issue::new(
                IssueSeverity::Warning,
                "gitignore",
                &format!("'{}' is missing from .gitignore", entry),
            ),
            format!("Added {} to .gitignore", entry),
        );
    }
    Ok(())
}

/// With `autoGitignore`, every tracked path is listed in `info/exclude`.
pub fn check_exclude_entries(
    pair: &RepositoryPair,
    config: &PrivateConfig,
    report: &mut CleanupReport,
) -> Result<()> {
    if !config.settings.auto_gitignore {
        return Ok(());
    }

    let entries: Vec<String> = config.tracked_paths.iter().map(|p| exclude_entry(p)).collect();
    let exclude_file = pair.main.exclude_file()?;
    for entry in append_missing_lines(&exclude_file, &entries)? {
        report.record_repair(
            Issue::new(
                IssueSeverity::Warning,
                "exclude",
                &format!("'{}' is missing from the main exclude file", entry),
            )
            .with_path(&exclude_file.display().to_string()),
            format!("Added {} to {}", entry, exclude_file.display()),
        );
    }
    Ok(())
}

/// Delete backup artifacts left by interrupted operations.
pub fn check_stale_backups(ctx: &ProjectContext, report: &mut CleanupReport) {
    let mut artifacts = Vec::new();
    collect_backup_artifacts(&ctx.backups_dir(), &mut artifacts);
    collect_backup_artifacts(&ctx.storage_dir, &mut artifacts);

    for artifact in artifacts {
        let issue = Issue::new(
            IssueSeverity::Warning,
            "stale_backup",
            "Backup left by an interrupted operation",
        )
        .with_path(&artifact.display().to_string());

        match remove_path(&artifact) {
            Ok(()) => report.record_repair(issue, format!("Deleted {}", artifact.display())),
            Err(e) => {
                warn!(path = %artifact.display(), error = %e, "could not delete stale backup");
                report
                    .issues
                    .push(issue.with_remediation("Delete the file by hand"));
            }
        }
    }
}

/// Walk `dir` without following links or entering `.git`.
fn collect_backup_artifacts(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();

        if is_backup_artifact(&name) {
            out.push(path);
            continue;
        }

        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        if is_dir && name != ".git" {
            collect_backup_artifacts(&path, out);
        }
    }
}

pub fn check_repositories(pair: &RepositoryPair, report: &mut CleanupReport) {
    for (label, repo) in [("main", &pair.main), ("private", &pair.private)] {
        let health = repo.check_repository_health();
        for problem in health.issues {
            report.issues.push(
                Issue::new(
                    IssueSeverity::Error,
                    "repository",
                    &format!("{} repository: {}", label, problem),
                )
                .with_path(&repo.work_dir().display().to_string()),
            );
        }
    }
}
