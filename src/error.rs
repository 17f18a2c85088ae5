//! Error types for pgit.
//!
//! Uses thiserror for derive macros. Every variant maps to a machine-checkable
//! [`ErrorKind`] and a `recoverable` flag so callers (and tests) can assert why
//! something failed, not just that it failed.

use crate::exit_codes;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of an error for uniform handling and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Not initialized, unsupported platform, missing storage.
    Environment,
    /// Unsafe path, malformed input, oversized batch.
    Validation,
    /// Path is already tracked.
    AlreadyTracked,
    /// Path is not tracked.
    NotTracked,
    /// A step of a multi-step mutation failed (rolled back).
    Transaction,
    /// A git command failed.
    Git,
    /// Configuration file corrupted or invalid.
    Config,
    /// Configuration migration failed.
    Migration,
    /// Permission denied, disk full, resource busy.
    System,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Environment => "environment",
            ErrorKind::Validation => "validation",
            ErrorKind::AlreadyTracked => "already_tracked",
            ErrorKind::NotTracked => "not_tracked",
            ErrorKind::Transaction => "transaction",
            ErrorKind::Git => "git",
            ErrorKind::Config => "config",
            ErrorKind::Migration => "migration",
            ErrorKind::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// Main error type for pgit operations.
#[derive(Error, Debug)]
pub enum PgitError {
    /// pgit has not been initialized in this project.
    #[error("{0}")]
    NotInitialized(String),

    /// pgit is already initialized in this project.
    #[error("pgit is already initialized (found '{}')", .0.display())]
    AlreadyInitialized(PathBuf),

    /// The current platform cannot do what was asked (e.g. symlinks).
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A directory the command needs does not exist.
    #[error("{0}")]
    Environment(String),

    /// A path failed safety validation.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Malformed user input (commit message, branch name, arguments).
    #[error("{0}")]
    InvalidInput(String),

    /// Too many paths in a single batch.
    #[error("batch of {size} paths exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The path is already tracked in private storage.
    #[error("'{0}' is already tracked")]
    AlreadyTracked(String),

    /// The path is not tracked in private storage.
    #[error("'{0}' is not tracked")]
    NotTracked(String),

    /// The directory is not a git repository.
    #[error("git repository not found at '{}'", .0.display())]
    RepositoryNotFound(PathBuf),

    /// A git command failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// A file that was expected to exist is missing.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A filesystem step failed.
    #[error("{0}")]
    Filesystem(String),

    /// Symlink creation or removal failed.
    #[error("symlink error: {0}")]
    Symlink(String),

    /// A created symlink does not resolve to the requested target.
    #[error(
        "symlink '{}' resolves to '{}' instead of '{}'",
        link.display(),
        actual.display(),
        expected.display()
    )]
    SymlinkVerification {
        link: PathBuf,
        expected: PathBuf,
        actual: PathBuf,
    },

    /// The configuration file is not valid JSON.
    #[error("configuration file is corrupted: {0}")]
    ConfigCorrupted(String),

    /// The configuration file parsed but has missing or malformed fields.
    #[error("configuration is invalid: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    /// A configuration migration step failed.
    #[error("configuration migration failed: {0}")]
    MigrationFailed(String),

    /// Permission denied by the operating system.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No space left on device.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// Resource busy or locked by another process.
    #[error("resource busy: {0}")]
    ResourceBusy(String),
}

impl PgitError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PgitError::NotInitialized(_)
            | PgitError::AlreadyInitialized(_)
            | PgitError::UnsupportedPlatform(_)
            | PgitError::Environment(_)
            | PgitError::RepositoryNotFound(_) => ErrorKind::Environment,
            PgitError::InvalidPath { .. }
            | PgitError::InvalidInput(_)
            | PgitError::BatchTooLarge { .. } => ErrorKind::Validation,
            PgitError::AlreadyTracked(_) => ErrorKind::AlreadyTracked,
            PgitError::NotTracked(_) => ErrorKind::NotTracked,
            PgitError::FileNotFound(_)
            | PgitError::Filesystem(_)
            | PgitError::Symlink(_)
            | PgitError::SymlinkVerification { .. } => ErrorKind::Transaction,
            PgitError::Git(_) => ErrorKind::Git,
            PgitError::ConfigCorrupted(_) | PgitError::ConfigValidation(_) => ErrorKind::Config,
            PgitError::MigrationFailed(_) => ErrorKind::Migration,
            PgitError::PermissionDenied(_) | PgitError::DiskFull(_) | PgitError::ResourceBusy(_) => {
                ErrorKind::System
            }
        }
    }

    /// Whether retrying with corrected input or environment can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Transaction | ErrorKind::Git | ErrorKind::System => {
                true
            }
            ErrorKind::Environment
            | ErrorKind::AlreadyTracked
            | ErrorKind::NotTracked
            | ErrorKind::Config
            | ErrorKind::Migration => false,
        }
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        exit_codes::FAILURE
    }

    /// Map a low-level I/O error into the error taxonomy.
    ///
    /// `context` describes what was being attempted, e.g.
    /// "failed to move 'a' to 'b'".
    pub fn from_io(err: io::Error, context: impl AsRef<str>) -> Self {
        let context = context.as_ref();
        let message = format!("{}: {}", context, err);
        // ENOSPC / EBUSY
        if cfg!(unix) {
            match err.raw_os_error() {
                Some(28) => return PgitError::DiskFull(message),
                Some(16) => return PgitError::ResourceBusy(message),
                _ => {}
            }
        }
        match err.kind() {
            io::ErrorKind::PermissionDenied => PgitError::PermissionDenied(message),
            io::ErrorKind::StorageFull => PgitError::DiskFull(message),
            io::ErrorKind::ResourceBusy => PgitError::ResourceBusy(message),
            _ => PgitError::Filesystem(message),
        }
    }
}

/// Result type alias for pgit operations.
pub type Result<T> = std::result::Result<T, PgitError>;
