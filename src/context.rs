//! Project context resolution for pgit.
//!
//! This module finds the main repository root from any working directory and
//! resolves the fixed relative layout pgit uses inside it:
//!
//! - `.private-config.json`  - the configuration record
//! - `.private-storage/`     - the private repository holding relocated files
//! - `.git-private/`         - marker directory (backups, event log)
//!
//! All pgit commands go through this module to locate state, so operations
//! target the same files regardless of where the command is invoked from.

use crate::error::{PgitError, Result};
use crate::git;
use std::env;
use std::path::{Path, PathBuf};

/// Configuration file name, relative to the project root.
pub const DEFAULT_CONFIG_FILE: &str = ".private-config.json";

/// Private storage directory, relative to the project root.
pub const DEFAULT_STORAGE_DIR: &str = ".private-storage";

/// Marker directory denoting an initialized project.
pub const DEFAULT_MARKER_DIR: &str = ".git-private";

/// Entries every initialized project keeps in the main `.gitignore`.
pub const REQUIRED_IGNORE_ENTRIES: &[&str] = &[
    ".git-private/",
    ".private-storage/",
    ".private-config.json",
];

/// Resolved paths for a pgit project. All paths are absolute.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Root of the main working tree.
    pub project_root: PathBuf,

    /// Path to `.private-config.json`.
    pub config_path: PathBuf,

    /// Path to `.private-storage/`.
    pub storage_dir: PathBuf,

    /// Path to `.git-private/`.
    pub marker_dir: PathBuf,
}

impl ProjectContext {
    /// Resolve the project context from the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            PgitError::Environment(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd)
    }

    /// Resolve the project context from a specific directory.
    ///
    /// Invoking from inside `.private-storage/` (a repository of its own)
    /// still resolves to the enclosing project.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P) -> Result<Self> {
        let mut root = git::get_repo_root(cwd.as_ref())?;

        if root.file_name().is_some_and(|n| n == DEFAULT_STORAGE_DIR)
            && let Some(parent) = root.parent()
            && parent.join(DEFAULT_CONFIG_FILE).exists()
        {
            root = parent.to_path_buf();
        }

        Ok(Self::at_root(root))
    }

    /// Build the layout for a known project root without consulting git.
    pub fn at_root<P: Into<PathBuf>>(project_root: P) -> Self {
        let project_root = project_root.into();
        Self {
            config_path: project_root.join(DEFAULT_CONFIG_FILE),
            storage_dir: project_root.join(DEFAULT_STORAGE_DIR),
            marker_dir: project_root.join(DEFAULT_MARKER_DIR),
            project_root,
        }
    }

    /// Whether the project has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.config_path.exists() && self.marker_dir.is_dir()
    }

    /// Ensure pgit is initialized, returning an error guiding the user if not.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(PgitError::NotInitialized(format!(
                "pgit is not initialized in this project.\n\
                 Expected configuration at: {}\n\n\
                 Run `pgit init` to initialize private tracking.",
                self.config_path.display()
            )));
        }

        if !self.marker_dir.is_dir() {
            return Err(PgitError::NotInitialized(format!(
                "pgit marker directory not found.\n\
                 Expected: {}\n\n\
                 Run `pgit cleanup` or re-initialize with `pgit init`.",
                self.marker_dir.display()
            )));
        }

        Ok(())
    }

    /// Directory holding transient backup artifacts.
    pub fn backups_dir(&self) -> PathBuf {
        self.marker_dir.join("backups")
    }

    /// Path to the append-only event log.
    pub fn events_file(&self) -> PathBuf {
        self.marker_dir.join("events.ndjson")
    }

    /// Path to the main repository's `.gitignore`.
    pub fn gitignore_path(&self) -> PathBuf {
        self.project_root.join(".gitignore")
    }
}
