use crate::commands::init::{self, InitOptions};
use crate::context::ProjectContext;
use crate::platform::Capabilities;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// A git repository on `main` with one commit containing `README.md`.
pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    init_test_repo(temp_dir.path());
    temp_dir
}

/// Turn `path` (created if needed) into a repository like [`create_test_repo`].
pub(crate) fn init_test_repo(path: &Path) {
    std::fs::create_dir_all(path).unwrap();

    git(path, &["init"]);
    // Deterministic default branch name across environments.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);
    git(path, &["config", "commit.gpgsign", "false"]);

    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-m", "Initial commit"]);
}

/// A test repository with pgit initialized in it.
pub(crate) fn create_initialized_project() -> (TempDir, ProjectContext) {
    let temp_dir = create_test_repo();
    let ctx = ProjectContext::resolve_from(temp_dir.path()).unwrap();
    init::run(&ctx, &Capabilities::detect(), &InitOptions::default()).unwrap();
    (temp_dir, ctx)
}

/// Write a file relative to `root`, creating parent directories.
pub(crate) fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// `git status --porcelain` of a repository, for before/after comparisons.
pub(crate) fn porcelain(repo_dir: &Path) -> String {
    git_stdout(repo_dir, &["status", "--porcelain", "--untracked-files=all"])
}

/// Number of commits reachable from HEAD.
pub(crate) fn commit_count(repo_dir: &Path) -> usize {
    git_stdout(repo_dir, &["rev-list", "--count", "HEAD"])
        .trim()
        .parse()
        .unwrap()
}

pub(crate) fn git_stdout(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub(crate) fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }
}
