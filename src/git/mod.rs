//! Git command runner and repository adapter for pgit.
//!
//! Provides a safe wrapper around git commands with captured stdout/stderr
//! and structured error handling. All git operations go through this module;
//! [`GitRepository`] binds the runner to one working directory and
//! [`RepositoryPair`] holds the main and private repositories together.

mod pair;
mod repository;
mod status;

pub use pair::RepositoryPair;
pub use repository::{DiffOptions, GitRepository, LogEntry, RepositoryHealth};
pub use status::{FileStatus, GitStatus};

use crate::error::{PgitError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Result of a successful git command execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Returns true if stdout is empty.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
    }

    /// Returns stdout lines as a vector.
    pub fn lines(&self) -> Vec<&str> {
        if self.stdout.is_empty() {
            Vec::new()
        } else {
            self.stdout.lines().collect()
        }
    }
}

/// Run a git command with the specified working directory.
///
/// # Returns
///
/// * `Ok(GitOutput)` - On successful execution (exit code 0)
/// * `Err(PgitError::Git)` - On non-zero exit code or spawn failure
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| {
            PgitError::Git(format!(
                "failed to execute git {}: {}",
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if git_output.stderr.is_empty() {
            git_output.stdout.clone()
        } else {
            git_output.stderr.clone()
        };

        Err(PgitError::Git(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

/// Run a git command on raw bytes: `input` is fed to stdin and stdout is
/// returned untouched. Used where output carries NUL-separated paths.
pub fn run_git_raw<P: AsRef<Path>>(cwd: P, args: &[&str], input: Option<&[u8]>) -> Result<Vec<u8>> {
    let spawn_error = |e: std::io::Error| {
        PgitError::Git(format!(
            "failed to execute git {}: {}",
            args.first().unwrap_or(&""),
            e
        ))
    };

    let mut child = Command::new("git")
        .current_dir(cwd.as_ref())
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    if let Some(input) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin.write_all(input).map_err(spawn_error)?;
    }

    let output = child.wait_with_output().map_err(spawn_error)?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(PgitError::Git(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Get the repository root directory using `git rev-parse --show-toplevel`.
///
/// # Returns
///
/// * `Ok(PathBuf)` - The absolute path to the repository root
/// * `Err(PgitError::Environment)` - If not inside a git repository
pub fn get_repo_root<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let output = run_git_for_repo_detection(cwd.as_ref(), &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(&output.stdout))
}

/// Like [`run_git`], but reports "not a repository" as an environment error
/// rather than a git failure.
fn run_git_for_repo_detection<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| {
            PgitError::Environment(format!("failed to execute git: {} (is git installed?)", e))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let stderr = &git_output.stderr;
        if stderr.contains("not a git repository") || stderr.contains("fatal:") {
            Err(PgitError::Environment(
                "not inside a git repository. Run this command from within a git repository."
                    .to_string(),
            ))
        } else {
            Err(PgitError::Environment(format!(
                "git command failed: {}",
                if stderr.is_empty() {
                    &git_output.stdout
                } else {
                    stderr
                }
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_repo;
    use tempfile::TempDir;

    #[test]
    fn test_run_git_success() {
        let temp_dir = create_test_repo();
        let result = run_git(temp_dir.path(), &["status", "--porcelain"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_git_captures_stdout() {
        let temp_dir = create_test_repo();
        let output = run_git(temp_dir.path(), &["rev-parse", "--show-toplevel"]).unwrap();
        assert!(!output.stdout.is_empty());
    }

    #[test]
    fn test_run_git_failure_returns_git_error() {
        let temp_dir = create_test_repo();
        let err = run_git(temp_dir.path(), &["checkout", "nonexistent-branch"]).unwrap_err();
        assert!(matches!(err, PgitError::Git(_)));
    }

    #[test]
    fn test_get_repo_root_from_subdirectory() {
        let temp_dir = create_test_repo();
        let subdir = temp_dir.path().join("subdir").join("nested");
        std::fs::create_dir_all(&subdir).unwrap();

        let root = get_repo_root(&subdir).unwrap();
        let expected = temp_dir.path().canonicalize().unwrap();
        assert_eq!(root.canonicalize().unwrap(), expected);
    }

    #[test]
    fn test_get_repo_root_outside_repo_returns_environment_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = get_repo_root(temp_dir.path()).unwrap_err();
        assert!(matches!(err, PgitError::Environment(_)));
        assert!(err.to_string().contains("not inside a git repository"));
    }

    #[test]
    fn test_git_output_lines() {
        let output = GitOutput {
            stdout: "line1\nline2\nline3".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.lines(), vec!["line1", "line2", "line3"]);

        let empty = GitOutput {
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(empty.lines().is_empty());
        assert!(empty.is_empty());
    }
}
