//! Symbolic link management.
//!
//! Every link pgit creates is verified after creation: the link must
//! canonicalize to the same location as the requested target, otherwise it is
//! removed again and the creation fails. Removal only ever deletes the link
//! entry, never what it points at.

use crate::error::{PgitError, Result};
use crate::platform::Capabilities;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Options for [`SymlinkManager::create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    /// Replace an existing symlink at the link path.
    pub force: bool,
    /// Create missing parent directories of the link path.
    pub create_parents: bool,
    /// The target is a directory (matters on Windows only).
    pub is_directory: bool,
    /// Store the target relative to the link's directory.
    pub relative: bool,
}

/// A problem found by [`SymlinkManager::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymlinkIssue {
    /// Nothing exists at the link path.
    Missing,
    /// Something exists at the link path but it is not a symlink.
    NotASymlink,
    /// The link exists but its target does not.
    DanglingTarget,
}

/// State of one link path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymlinkInfo {
    pub link_path: PathBuf,
    /// Raw link text as stored in the link.
    pub link_target: Option<PathBuf>,
    /// Link text resolved against the link's directory.
    pub resolved_target: Option<PathBuf>,
    pub exists: bool,
    pub is_symlink: bool,
    pub target_exists: bool,
    pub issues: Vec<SymlinkIssue>,
}

impl SymlinkInfo {
    pub fn is_healthy(&self) -> bool {
        self.exists && self.is_symlink && self.target_exists
    }
}

#[derive(Debug, Clone)]
pub struct SymlinkManager {
    supports_symlinks: bool,
}

impl SymlinkManager {
    pub fn new(capabilities: &Capabilities) -> Self {
        Self {
            supports_symlinks: capabilities.supports_symlinks,
        }
    }

    /// Create a link at `link_path` pointing at `target` and verify it.
    pub fn create(&self, target: &Path, link_path: &Path, options: LinkOptions) -> Result<()> {
        if !self.supports_symlinks {
            return Err(PgitError::UnsupportedPlatform(
                "this platform does not support symbolic links".to_string(),
            ));
        }

        if fs::metadata(target).is_err() {
            return Err(PgitError::FileNotFound(target.to_path_buf()));
        }

        if let Ok(meta) = fs::symlink_metadata(link_path) {
            if !options.force {
                return Err(PgitError::Symlink(format!(
                    "'{}' already exists",
                    link_path.display()
                )));
            }
            if !meta.file_type().is_symlink() {
                return Err(PgitError::Symlink(format!(
                    "refusing to replace '{}': it is not a symlink",
                    link_path.display()
                )));
            }
            remove_link_entry(link_path).map_err(|e| link_io_error(e, link_path))?;
        }

        if let Some(parent) = link_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            if !options.create_parents {
                return Err(PgitError::Symlink(format!(
                    "parent directory of '{}' does not exist",
                    link_path.display()
                )));
            }
            fs::create_dir_all(parent).map_err(|e| {
                PgitError::from_io(
                    e,
                    format!("failed to create directory '{}'", parent.display()),
                )
            })?;
        }

        let link_text = if options.relative {
            relative_link_text(link_path, target)?
        } else {
            target.to_path_buf()
        };

        platform_symlink(&link_text, link_path, options.is_directory)
            .map_err(|e| link_io_error(e, link_path))?;

        self.verify(link_path, target)?;
        debug!(link = %link_path.display(), target = %link_text.display(), "created symlink");
        Ok(())
    }

    fn verify(&self, link_path: &Path, target: &Path) -> Result<()> {
        let expected = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
        match link_path.canonicalize() {
            Ok(actual) if actual == expected => Ok(()),
            resolved => {
                let actual = resolved.unwrap_or_else(|_| {
                    fs::read_link(link_path).unwrap_or_else(|_| link_path.to_path_buf())
                });
                let _ = remove_link_entry(link_path);
                Err(PgitError::SymlinkVerification {
                    link: link_path.to_path_buf(),
                    expected,
                    actual,
                })
            }
        }
    }

    /// Inspect `link_path` without raising.
    pub fn validate(&self, link_path: &Path) -> SymlinkInfo {
        let mut info = SymlinkInfo {
            link_path: link_path.to_path_buf(),
            link_target: None,
            resolved_target: None,
            exists: false,
            is_symlink: false,
            target_exists: false,
            issues: Vec::new(),
        };

        let Ok(meta) = fs::symlink_metadata(link_path) else {
            info.issues.push(SymlinkIssue::Missing);
            return info;
        };
        info.exists = true;

        if !meta.file_type().is_symlink() {
            info.issues.push(SymlinkIssue::NotASymlink);
            return info;
        }
        info.is_symlink = true;

        if let Ok(text) = fs::read_link(link_path) {
            let resolved = if text.is_absolute() {
                text.clone()
            } else {
                link_path.parent().unwrap_or(Path::new("")).join(&text)
            };
            info.link_target = Some(text);
            info.resolved_target = Some(resolved);
        }

        info.target_exists = fs::metadata(link_path).is_ok();
        if !info.target_exists {
            info.issues.push(SymlinkIssue::DanglingTarget);
        }

        info
    }

    /// Whether `link_path` resolves to the same location as `expected`.
    pub fn points_to(&self, link_path: &Path, expected: &Path) -> bool {
        match (link_path.canonicalize(), expected.canonicalize()) {
            (Ok(actual), Ok(expected)) => actual == expected,
            _ => false,
        }
    }

    /// A link can be repaired when its intended target exists and nothing
    /// but a (possibly broken) link occupies the link path.
    pub fn is_repairable(&self, link_path: &Path, expected_target: &Path) -> bool {
        if fs::metadata(expected_target).is_err() {
            return false;
        }
        match fs::symlink_metadata(link_path) {
            Ok(meta) => meta.file_type().is_symlink(),
            Err(_) => true,
        }
    }

    /// Replace whatever link sits at `link_path` with a verified relative link
    /// to `new_target`.
    pub fn repair(&self, link_path: &Path, new_target: &Path) -> Result<()> {
        if let Ok(meta) = fs::symlink_metadata(link_path) {
            if !meta.file_type().is_symlink() {
                return Err(PgitError::Symlink(format!(
                    "refusing to repair '{}': it is not a symlink",
                    link_path.display()
                )));
            }
            remove_link_entry(link_path).map_err(|e| link_io_error(e, link_path))?;
        }

        self.create(
            new_target,
            link_path,
            LinkOptions {
                force: false,
                create_parents: true,
                is_directory: new_target.is_dir(),
                relative: true,
            },
        )
    }

    /// Delete the link entry at `link_path`.
    pub fn remove(&self, link_path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(link_path)
            .map_err(|_| PgitError::FileNotFound(link_path.to_path_buf()))?;
        if !meta.file_type().is_symlink() {
            return Err(PgitError::Symlink(format!(
                "refusing to remove '{}': it is not a symlink",
                link_path.display()
            )));
        }
        remove_link_entry(link_path).map_err(|e| link_io_error(e, link_path))
    }
}

fn link_io_error(err: io::Error, link_path: &Path) -> PgitError {
    match PgitError::from_io(err, format!("symlink '{}'", link_path.display())) {
        PgitError::Filesystem(message) => PgitError::Symlink(message),
        other => other,
    }
}

/// Link text leading from the directory of `link_path` to `target`.
fn relative_link_text(link_path: &Path, target: &Path) -> Result<PathBuf> {
    let link_dir = absolute(link_path.parent().unwrap_or(Path::new("")))?;
    let target = absolute(target)?;

    let from: Vec<Component> = link_dir.components().collect();
    let to: Vec<Component> = target.components().collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut text = PathBuf::new();
    for _ in common..from.len() {
        text.push("..");
    }
    for component in &to[common..] {
        text.push(component.as_os_str());
    }
    Ok(text)
}

/// Absolute form of `path`, canonical where the path exists.
fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| PgitError::from_io(e, "failed to read current directory".to_string()))?;
    Ok(cwd.join(path))
}

#[cfg(unix)]
fn platform_symlink(text: &Path, link_path: &Path, _is_directory: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(text, link_path)
}

#[cfg(windows)]
fn platform_symlink(text: &Path, link_path: &Path, is_directory: bool) -> io::Result<()> {
    if is_directory {
        std::os::windows::fs::symlink_dir(text, link_path)
    } else {
        std::os::windows::fs::symlink_file(text, link_path)
    }
}

#[cfg(unix)]
fn remove_link_entry(link_path: &Path) -> io::Result<()> {
    fs::remove_file(link_path)
}

#[cfg(windows)]
fn remove_link_entry(link_path: &Path) -> io::Result<()> {
    fs::remove_file(link_path).or_else(|_| fs::remove_dir(link_path))
}
