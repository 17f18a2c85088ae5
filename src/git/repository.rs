//! Repository adapter bound to a single working directory.
//!
//! pgit always operates two independent instances: one for the main working
//! tree and one for the private storage repository. Every operation first
//! asserts that the bound directory is itself a repository root, so that a
//! storage directory without its own `.git` never silently delegates to the
//! enclosing main repository.

use super::status::GitStatus;
use super::{GitOutput, run_git, run_git_raw};
use crate::error::{PgitError, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BRANCH_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").expect("valid regex"));

/// Field separator used in `git log` formats.
const LOG_FIELD_SEP: char = '\u{1f}';

/// One commit in repository history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    /// ISO-8601 author date.
    pub date: String,
    pub message: String,
}

/// Options for [`GitRepository::diff`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Compare the index against HEAD instead of the working tree against the index.
    pub cached: bool,
    /// Only list changed file names.
    pub name_only: bool,
}

/// Result of [`GitRepository::check_repository_health`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepositoryHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
}

/// A git repository rooted at one working directory.
#[derive(Debug, Clone)]
pub struct GitRepository {
    work_dir: PathBuf,
}

impl GitRepository {
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Create a new repository at `work_dir` with `main` as the initial branch.
    pub fn init<P: Into<PathBuf>>(work_dir: P) -> Result<Self> {
        let repo = Self::new(work_dir);
        fs::create_dir_all(&repo.work_dir).map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to create directory '{}'", repo.work_dir.display()),
            )
        })?;
        run_git(&repo.work_dir, &["init", "-q"])?;
        run_git(&repo.work_dir, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        Ok(repo)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Whether the working directory is the root of its own repository.
    pub fn is_repository(&self) -> bool {
        if !self.work_dir.join(".git").exists() {
            return false;
        }

        let Ok(output) = run_git(&self.work_dir, &["rev-parse", "--show-toplevel"]) else {
            return false;
        };

        match (
            Path::new(&output.stdout).canonicalize(),
            self.work_dir.canonicalize(),
        ) {
            (Ok(toplevel), Ok(work_dir)) => toplevel == work_dir,
            _ => false,
        }
    }

    /// Fail with `RepositoryNotFound` unless [`is_repository`](Self::is_repository).
    pub fn ensure_repository(&self) -> Result<()> {
        if self.is_repository() {
            Ok(())
        } else {
            Err(PgitError::RepositoryNotFound(self.work_dir.clone()))
        }
    }

    fn git(&self, args: &[&str]) -> Result<GitOutput> {
        self.ensure_repository()?;
        run_git(&self.work_dir, args)
    }

    /// Current working-tree and index state.
    pub fn status(&self) -> Result<GitStatus> {
        let output = self.git(&[
            "status",
            "--porcelain=v1",
            "-b",
            "-z",
            "--untracked-files=all",
        ])?;
        Ok(GitStatus::parse(&output.stdout))
    }

    /// Stage the given paths, failing with `FileNotFound` for any that are missing.
    /// Explicitly named paths are staged even when an ignore rule matches them.
    pub fn add_files<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        self.ensure_repository()?;
        if paths.is_empty() {
            return Ok(());
        }

        for path in paths {
            let full = self.work_dir.join(path.as_ref());
            if fs::symlink_metadata(&full).is_err() {
                return Err(PgitError::FileNotFound(full));
            }
        }

        let mut args = vec!["add", "-f", "--"];
        args.extend(paths.iter().map(|p| p.as_ref()));
        self.git(&args)?;
        Ok(())
    }

    /// Stage every change, including untracked files.
    pub fn add_all(&self) -> Result<()> {
        self.git(&["add", "-A"])?;
        Ok(())
    }

    /// Stage modifications and deletions of already-tracked files.
    pub fn add_updated(&self) -> Result<()> {
        self.git(&["add", "-u"])?;
        Ok(())
    }

    /// Remove paths from the index.
    ///
    /// With `keep_working_copy` only the index entry goes away and the content
    /// stays on disk; otherwise the files are deleted as well.
    pub fn remove_from_index<S: AsRef<str>>(&self, paths: &[S], keep_working_copy: bool) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut args = vec!["rm", "-r", "-q"];
        if keep_working_copy {
            args.push("--cached");
        }
        args.push("--");
        args.extend(paths.iter().map(|p| p.as_ref()));
        self.git(&args)?;
        Ok(())
    }

    /// Index records under `path` exactly as `ls-files --stage -z` prints them.
    ///
    /// Empty when nothing under `path` is in the index.
    pub fn index_entries(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_repository()?;
        run_git_raw(&self.work_dir, &["ls-files", "--stage", "-z", "--", path], None)
    }

    /// Replace every index entry under `path` with `entries`, as returned by
    /// [`GitRepository::index_entries`]. The working tree is not touched.
    pub fn restore_index_entries(&self, path: &str, entries: &[u8]) -> Result<()> {
        self.git(&["rm", "--cached", "-r", "-q", "--ignore-unmatch", "--", path])?;
        if entries.is_empty() {
            return Ok(());
        }
        run_git_raw(
            &self.work_dir,
            &["update-index", "-z", "--index-info"],
            Some(entries),
        )?;
        Ok(())
    }

    /// Reset the index entries of `paths` to HEAD, leaving the working tree alone.
    pub fn unstage<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut args = if self.head_commit()?.is_some() {
            vec!["reset", "-q", "HEAD", "--"]
        } else {
            vec!["rm", "--cached", "-r", "-q", "--ignore-unmatch", "--"]
        };
        args.extend(paths.iter().map(|p| p.as_ref()));
        self.git(&args)?;
        Ok(())
    }

    /// Commit the index and return the new commit id.
    pub fn commit(&self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(PgitError::InvalidInput(
                "commit message must not be empty".to_string(),
            ));
        }

        self.git(&["commit", "-q", "-m", message])?;
        self.head_commit()?
            .ok_or_else(|| PgitError::Git("HEAD does not resolve after commit".to_string()))
    }

    /// Create an empty root commit so HEAD resolves in a fresh repository.
    pub fn commit_initial(&self, message: &str) -> Result<String> {
        self.git(&["commit", "-q", "--allow-empty", "-m", message])?;
        self.head_commit()?
            .ok_or_else(|| PgitError::Git("HEAD does not resolve after commit".to_string()))
    }

    /// Commit id of HEAD, `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<String>> {
        self.ensure_repository()?;
        match run_git(&self.work_dir, &["rev-parse", "--verify", "-q", "HEAD"]) {
            Ok(output) => Ok(Some(output.stdout)),
            Err(_) => Ok(None),
        }
    }

    /// Short name of the checked-out branch, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        self.ensure_repository()?;
        match run_git(&self.work_dir, &["symbolic-ref", "--short", "-q", "HEAD"]) {
            Ok(output) => Ok(Some(output.stdout)),
            Err(_) => Ok(None),
        }
    }

    /// Whether git tracks `path` (any file under it, for directories).
    pub fn is_tracked(&self, path: &str) -> Result<bool> {
        self.ensure_repository()?;
        Ok(run_git(&self.work_dir, &["ls-files", "--error-unmatch", "--", path]).is_ok())
    }

    /// Whether the index differs from HEAD.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let output = self.git(&["diff", "--cached", "--name-only"])?;
        Ok(!output.is_empty())
    }

    /// Local branch names.
    pub fn branches(&self) -> Result<Vec<String>> {
        let output = self.git(&["branch", "--format=%(refname:short)"])?;
        Ok(output.lines().into_iter().map(str::to_string).collect())
    }

    /// Create a branch at HEAD without switching to it.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        self.ensure_repository()?;
        run_git(&self.work_dir, &["check-ref-format", "--branch", name])
            .map_err(|_| PgitError::InvalidInput(format!("invalid branch name '{}'", name)))?;
        self.git(&["branch", name])?;
        Ok(())
    }

    /// Switch to a branch or commit.
    pub fn checkout(&self, target: &str) -> Result<()> {
        if target.trim().is_empty() || target.starts_with('-') {
            return Err(PgitError::InvalidInput(format!(
                "invalid checkout target '{}'",
                target
            )));
        }
        self.git(&["checkout", "-q", target])?;
        Ok(())
    }

    /// Most recent commits, newest first. Empty on an unborn branch.
    pub fn log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        if self.head_commit()?.is_none() {
            return Ok(Vec::new());
        }

        let count = format!("-n{}", limit.max(1));
        let output = self.git(&[
            "log",
            &count,
            "--format=%H%x1f%h%x1f%an%x1f%aI%x1f%s",
        ])?;

        Ok(output
            .lines()
            .into_iter()
            .filter_map(|line| {
                let mut fields = line.split(LOG_FIELD_SEP);
                Some(LogEntry {
                    hash: fields.next()?.to_string(),
                    short_hash: fields.next()?.to_string(),
                    author: fields.next()?.to_string(),
                    date: fields.next()?.to_string(),
                    message: fields.next().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    /// Textual diff of the working tree or index.
    pub fn diff(&self, options: DiffOptions) -> Result<String> {
        let mut args = vec!["diff"];
        if options.cached {
            args.push("--cached");
        }
        if options.name_only {
            args.push("--name-only");
        }
        Ok(self.git(&args)?.stdout)
    }

    /// Location of this repository's `info/exclude` file.
    pub fn exclude_file(&self) -> Result<PathBuf> {
        let output = self.git(&["rev-parse", "--git-path", "info/exclude"])?;
        let path = PathBuf::from(&output.stdout);
        Ok(if path.is_absolute() {
            path
        } else {
            self.work_dir.join(path)
        })
    }

    /// Value of a config key, `None` when unset.
    pub fn config_value(&self, key: &str) -> Result<Option<String>> {
        self.ensure_repository()?;
        match run_git(&self.work_dir, &["config", "--get", key]) {
            Ok(output) if !output.is_empty() => Ok(Some(output.stdout)),
            _ => Ok(None),
        }
    }

    /// Set a config key in this repository's local config.
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value])?;
        Ok(())
    }

    /// Run independent health checks and collect every failure.
    pub fn check_repository_health(&self) -> RepositoryHealth {
        let mut issues = Vec::new();

        if !self.work_dir.join(".git").exists() {
            issues.push(format!(
                "git metadata directory missing in '{}'",
                self.work_dir.display()
            ));
        }

        if !self.is_repository() {
            issues.push(format!(
                "'{}' does not open as a repository root",
                self.work_dir.display()
            ));
        } else {
            if let Err(e) = self.status() {
                issues.push(format!("status query failed: {}", e));
            }
            if let Ok(None) | Err(_) = self.head_commit() {
                issues.push("HEAD does not resolve to a commit".to_string());
            }
        }

        RepositoryHealth {
            healthy: issues.is_empty(),
            issues,
        }
    }
}

/// Reject branch names git would refuse or that could be read as options.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(PgitError::InvalidInput(format!(
            "invalid branch name '{}': {}",
            name, reason
        )))
    };

    if name.trim().is_empty() {
        return invalid("name must not be empty");
    }
    if !BRANCH_NAME.is_match(name) {
        return invalid("use letters, digits, '.', '_', '-' and '/' only");
    }
    if name.contains("..") || name.contains("//") {
        return invalid("name must not contain '..' or '//'");
    }
    if name.ends_with('/') || name.ends_with(".lock") || name.ends_with('.') {
        return invalid("name must not end with '/', '.' or '.lock'");
    }
    Ok(())
}
