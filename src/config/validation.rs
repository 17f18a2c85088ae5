//! Structural validation of a configuration record.

use super::model::{MAX_BACKUPS_RANGE, PrivateConfig};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};

/// One failed check, addressed by its JSON field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Canonical spelling of a tracked path: `/`-separated, no `./` prefix, no
/// trailing separator.
pub fn normalize_tracked_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Check every field constraint and return all failures.
pub fn validate_config(config: &PrivateConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Err(e) = semver::Version::parse(&config.version) {
        issues.push(ValidationIssue::new(
            "version",
            format!("'{}' is not a semantic version: {}", config.version, e),
        ));
    }

    check_relative_dir(&mut issues, "privateRepoPath", &config.private_repo_path);
    check_relative_dir(&mut issues, "storagePath", &config.storage_path);

    let mut seen = HashSet::new();
    for (i, path) in config.tracked_paths.iter().enumerate() {
        let field = format!("trackedPaths[{}]", i);
        if path.trim().is_empty() {
            issues.push(ValidationIssue::new(field, "path must not be empty"));
            continue;
        }
        if let Some(reason) = unsafe_relative_path(path) {
            issues.push(ValidationIssue::new(field, reason));
            continue;
        }
        if !seen.insert(normalize_tracked_path(path)) {
            issues.push(ValidationIssue::new(
                field,
                format!("duplicate tracked path '{}'", path),
            ));
        }
    }

    if !MAX_BACKUPS_RANGE.contains(&config.settings.max_backups) {
        issues.push(ValidationIssue::new(
            "settings.maxBackups",
            format!(
                "must be between {} and {}, got {}",
                MAX_BACKUPS_RANGE.start(),
                MAX_BACKUPS_RANGE.end(),
                config.settings.max_backups
            ),
        ));
    }

    let metadata = &config.metadata;
    for (field, value) in [
        ("metadata.projectName", &metadata.project_name),
        ("metadata.mainRepoPath", &metadata.main_repo_path),
        ("metadata.platform", &metadata.platform),
    ] {
        if value.trim().is_empty() {
            issues.push(ValidationIssue::new(field, "must not be empty"));
        }
    }
    if semver::Version::parse(&metadata.cli_version).is_err() {
        issues.push(ValidationIssue::new(
            "metadata.cliVersion",
            format!("'{}' is not a semantic version", metadata.cli_version),
        ));
    }

    issues
}

fn check_relative_dir(issues: &mut Vec<ValidationIssue>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "must not be empty"));
    } else if let Some(reason) = unsafe_relative_path(value) {
        issues.push(ValidationIssue::new(field, reason));
    }
}

fn unsafe_relative_path(path: &str) -> Option<String> {
    let unified = path.replace('\\', "/");
    let as_path = Path::new(&unified);
    if as_path.is_absolute() || unified.starts_with('/') || unified.chars().nth(1) == Some(':') {
        return Some(format!("'{}' must be relative", path));
    }
    if as_path.components().any(|c| c == Component::ParentDir) {
        return Some(format!("'{}' must not traverse upward", path));
    }
    None
}
