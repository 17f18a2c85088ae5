//! Path validation for `pgit add`.
//!
//! All checks run before the pipeline touches anything. A batch is accepted
//! only when every entry is valid and untracked.

use crate::config::{PrivateConfig, normalize_tracked_path};
use crate::context::{DEFAULT_CONFIG_FILE, DEFAULT_MARKER_DIR, DEFAULT_STORAGE_DIR, ProjectContext};
use crate::error::{PgitError, Result};
use crate::fs::{PathPolicy, validate_path_string};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Characters refused in tracked paths.
const UNSAFE_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

/// A path that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidatedPath {
    /// Root-relative, `/`-separated.
    pub relative: String,
    pub absolute: PathBuf,
    pub is_dir: bool,
}

/// Outcome of validating a whole batch.
#[derive(Debug, Default)]
pub(crate) struct BatchValidation {
    pub valid: Vec<ValidatedPath>,
    pub already_tracked: Vec<String>,
    pub invalid: Vec<(String, PgitError)>,
}

impl BatchValidation {
    /// The valid paths, or the reason the batch is refused.
    ///
    /// A single problem is returned as-is so its kind survives; several are
    /// summarized into one validation error.
    pub fn into_result(mut self) -> Result<Vec<ValidatedPath>> {
        let problems = self.already_tracked.len() + self.invalid.len();
        if problems == 0 {
            return Ok(self.valid);
        }

        if problems == 1 {
            return Err(match self.already_tracked.pop() {
                Some(path) => PgitError::AlreadyTracked(path),
                None => match self.invalid.pop() {
                    Some((_, err)) => err,
                    None => PgitError::InvalidInput("batch rejected".to_string()),
                },
            });
        }

        let mut lines: Vec<String> = self
            .already_tracked
            .iter()
            .map(|path| format!("  - {}: already tracked", path))
            .collect();
        lines.extend(
            self.invalid
                .iter()
                .map(|(path, err)| format!("  - {}: {}", path, err)),
        );

        Err(PgitError::InvalidInput(format!(
            "{} of {} paths were rejected; nothing was changed:\n{}",
            problems,
            problems + self.valid.len(),
            lines.join("\n")
        )))
    }
}

/// Validate every raw path and partition the batch.
pub(crate) fn validate_batch<S: AsRef<str>>(
    ctx: &ProjectContext,
    config: &PrivateConfig,
    raw_paths: &[S],
) -> BatchValidation {
    let mut result = BatchValidation::default();
    let mut seen = HashSet::new();

    for raw in raw_paths {
        let raw = raw.as_ref();
        let rel = match normalize_input(raw) {
            Ok(rel) => rel,
            Err(err) => {
                result.invalid.push((raw.to_string(), err));
                continue;
            }
        };

        if config.is_tracked(&rel) {
            result.already_tracked.push(rel);
            continue;
        }

        if let Some(tracked) = config
            .tracked_paths
            .iter()
            .find(|tracked| is_nested(&rel, tracked))
        {
            result.invalid.push((
                raw.to_string(),
                invalid(&rel, &format!("overlaps tracked path '{}'", tracked)),
            ));
            continue;
        }

        if !seen.insert(rel.clone()) {
            result.invalid.push((raw.to_string(), invalid(&rel, "listed more than once")));
            continue;
        }

        if let Some(other) = result.valid.iter().find(|v| is_nested(&rel, &v.relative)) {
            let reason = format!("overlaps '{}' in the same batch", other.relative);
            result.invalid.push((raw.to_string(), invalid(&rel, &reason)));
            continue;
        }

        match resolve(ctx, rel) {
            Ok(validated) => result.valid.push(validated),
            Err(err) => result.invalid.push((raw.to_string(), err)),
        }
    }

    result
}

/// Syntactic checks. Returns the root-relative `/`-separated form.
fn normalize_input(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(invalid(raw, "path is empty"));
    }
    if raw.contains('\0') {
        return Err(invalid(raw, "path contains a NUL byte"));
    }
    if raw.chars().any(char::is_control) {
        return Err(invalid(raw, "path contains control characters"));
    }
    if let Some(c) = raw.chars().find(|c| UNSAFE_CHARS.contains(c)) {
        return Err(invalid(raw, &format!("path contains unsafe character '{}'", c)));
    }

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || Path::new(raw).is_absolute() || has_drive_prefix(&unified) {
        return Err(invalid(raw, "absolute paths are not allowed"));
    }
    if Path::new(&unified)
        .components()
        .any(|c| c == Component::ParentDir)
    {
        return Err(invalid(raw, "path traverses to a parent directory"));
    }

    let relative = normalize_tracked_path(&unified);
    if relative.is_empty() {
        return Err(invalid(raw, "path refers to the project root"));
    }

    validate_path_string(&relative, &PathPolicy::default())?;

    let first = relative.split('/').next().unwrap_or_default();
    if first == DEFAULT_STORAGE_DIR || first == DEFAULT_MARKER_DIR || relative == DEFAULT_CONFIG_FILE {
        return Err(invalid(&relative, "path belongs to pgit itself"));
    }

    Ok(relative)
}

/// Filesystem checks for a normalized path.
fn resolve(ctx: &ProjectContext, relative: String) -> Result<ValidatedPath> {
    let absolute = ctx.project_root.join(&relative);
    let meta = fs::symlink_metadata(&absolute)
        .map_err(|_| invalid(&relative, "path does not exist"))?;
    if meta.file_type().is_symlink() {
        return Err(invalid(&relative, "path is already a symbolic link"));
    }

    let root = canonical(&ctx.project_root)?;
    let parent = absolute.parent().unwrap_or(&ctx.project_root);
    let canonical_parent = canonical(parent)?;
    if !canonical_parent.starts_with(&root) {
        return Err(invalid(&relative, "path resolves outside the project"));
    }
    if let Ok(storage) = ctx.storage_dir.canonicalize()
        && canonical_parent.starts_with(&storage)
    {
        return Err(invalid(&relative, "path resolves into private storage"));
    }

    Ok(ValidatedPath {
        relative,
        absolute,
        is_dir: meta.is_dir(),
    })
}

fn invalid(path: &str, reason: &str) -> PgitError {
    PgitError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| PgitError::from_io(e, format!("failed to resolve '{}'", path.display())))
}

fn has_drive_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!((chars.next(), chars.next()), (Some(letter), Some(':')) if letter.is_ascii_alphabetic())
}

/// Whether one of two distinct root-relative paths contains the other.
fn is_nested(a: &str, b: &str) -> bool {
    let under = |child: &str, parent: &str| {
        child
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with('/'))
    };
    under(a, b) || under(b, a)
}
