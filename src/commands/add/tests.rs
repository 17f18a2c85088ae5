//! Tests for the add command.

use super::*;
use crate::commands::init::{self, InitOptions};
use crate::config::{ConfigStore, SettingsOverrides};
use crate::error::ErrorKind;
use crate::events::read_events;
use crate::test_support::{
    commit_count, create_initialized_project, create_test_repo, git, git_stdout, init_test_repo,
    porcelain, write_file,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};

fn add(ctx: &ProjectContext, paths: &[&str]) -> Result<AddOutcome> {
    run(ctx, &Capabilities::detect(), paths, &AddOptions::default())
}

fn add_failing_at(ctx: &ProjectContext, paths: &[&str], step: AddStep) -> Result<AddOutcome> {
    run(
        ctx,
        &Capabilities::detect(),
        paths,
        &AddOptions {
            fail_at: Some(step),
        },
    )
}

fn exclude_path(ctx: &ProjectContext) -> PathBuf {
    RepositoryPair::new(ctx).main.exclude_file().unwrap()
}

/// Everything an add may touch, for before/after comparisons.
#[derive(Debug, PartialEq)]
struct Snapshot {
    main_status: String,
    main_index: String,
    private_status: String,
    private_head: String,
    config: Vec<u8>,
    exclude: Option<Vec<u8>>,
    storage_files: String,
}

fn snapshot(ctx: &ProjectContext) -> Snapshot {
    Snapshot {
        main_status: porcelain(&ctx.project_root),
        main_index: git_stdout(&ctx.project_root, &["ls-files", "--stage"]),
        private_status: porcelain(&ctx.storage_dir),
        private_head: git_stdout(&ctx.storage_dir, &["rev-parse", "HEAD"]),
        config: fs::read(&ctx.config_path).unwrap(),
        exclude: fs::read(exclude_path(ctx)).ok(),
        storage_files: git_stdout(&ctx.storage_dir, &["ls-files"]),
    }
}

fn backups_left(ctx: &ProjectContext) -> usize {
    fs::read_dir(ctx.backups_dir()).unwrap().count()
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[test]
fn test_add_relocates_file_behind_symlink() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "config/.env", "SECRET=1\n");
    let pair = RepositoryPair::new(&ctx);

    let outcome = add(&ctx, &["config/.env"]).unwrap();

    assert_eq!(outcome.paths, vec!["config/.env"]);
    let link = pair.working_path_for("config/.env");
    let stored = pair.storage_path_for("config/.env");
    assert!(is_symlink(&link));
    assert_eq!(fs::read_link(&link).unwrap(), pair.link_target_for("config/.env"));
    assert_eq!(
        link.canonicalize().unwrap(),
        stored.canonicalize().unwrap()
    );
    assert_eq!(fs::read_to_string(&stored).unwrap(), "SECRET=1\n");
    assert_eq!(fs::read_to_string(&link).unwrap(), "SECRET=1\n");

    assert_eq!(commit_count(&ctx.storage_dir), 2);
    assert_eq!(
        git_stdout(&ctx.storage_dir, &["show", "--name-only", "--format=%s", "HEAD"]),
        "Track config/.env\n\nconfig/.env\n"
    );
    assert_eq!(pair.private.head_commit().unwrap(), Some(outcome.commit));
    assert!(porcelain(&ctx.storage_dir).is_empty());

    // Only init's .gitignore change remains visible in the main repository.
    assert_eq!(porcelain(&ctx.project_root), "?? .gitignore\n");

    let config = ConfigStore::new(&ctx).load().unwrap();
    assert_eq!(config.tracked_paths, vec!["config/.env"]);
    assert_eq!(backups_left(&ctx), 0);
}

#[test]
fn test_add_in_project_below_blocked_directory_name() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let root = temp_dir.path().join("node_modules/proj");
    init_test_repo(&root);
    let ctx = ProjectContext::resolve_from(&root).unwrap();
    init::run(&ctx, &Capabilities::detect(), &InitOptions::default()).unwrap();
    write_file(&ctx.project_root, "config/.env", "SECRET=1\n");

    add(&ctx, &["config/.env"]).unwrap();

    assert!(is_symlink(&ctx.project_root.join("config/.env")));
    assert_eq!(
        ConfigStore::new(&ctx).load().unwrap().tracked_paths,
        vec!["config/.env"]
    );
    let err = add(&ctx, &["web/node_modules/x"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_add_writes_exclude_entry() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "local.toml", "x");

    add(&ctx, &["local.toml"]).unwrap();

    let exclude = fs::read_to_string(exclude_path(&ctx)).unwrap();
    assert!(exclude.lines().any(|l| l == "/local.toml"));
}

#[test]
fn test_add_without_auto_gitignore_leaves_exclude_alone() {
    let temp_dir = create_test_repo();
    let ctx = ProjectContext::resolve_from(temp_dir.path()).unwrap();
    let options = InitOptions {
        settings: SettingsOverrides {
            auto_gitignore: Some(false),
            ..Default::default()
        },
        ..Default::default()
    };
    init::run(&ctx, &Capabilities::detect(), &options).unwrap();
    write_file(&ctx.project_root, "local.toml", "x");
    let before = fs::read(exclude_path(&ctx)).ok();

    add(&ctx, &["local.toml"]).unwrap();

    assert_eq!(fs::read(exclude_path(&ctx)).ok(), before);
    assert!(porcelain(&ctx.project_root).contains("?? local.toml"));
}

#[test]
fn test_add_untracks_committed_file_in_main() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "secrets.txt", "token");
    git(&ctx.project_root, &["add", "secrets.txt"]);
    git(&ctx.project_root, &["commit", "-q", "-m", "Add secrets"]);

    add(&ctx, &["secrets.txt"]).unwrap();

    assert!(git_stdout(&ctx.project_root, &["ls-files", "secrets.txt"]).is_empty());
    assert!(porcelain(&ctx.project_root).contains("D  secrets.txt"));
    assert!(is_symlink(&ctx.project_root.join("secrets.txt")));
}

#[test]
fn test_add_directory() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "keys/a.pem", "a");
    write_file(&ctx.project_root, "keys/nested/b.pem", "b");

    add(&ctx, &["keys/"]).unwrap();

    let link = ctx.project_root.join("keys");
    assert!(is_symlink(&link));
    assert_eq!(fs::read_to_string(link.join("nested/b.pem")).unwrap(), "b");
    assert_eq!(
        git_stdout(&ctx.storage_dir, &["ls-files"]),
        "keys/a.pem\nkeys/nested/b.pem\n"
    );
    let config = ConfigStore::new(&ctx).load().unwrap();
    assert_eq!(config.tracked_paths, vec!["keys"]);
}

#[test]
fn test_add_batch_makes_one_commit() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");
    write_file(&ctx.project_root, "dir/b.txt", "b");

    let outcome = add(&ctx, &["a.txt", "dir/b.txt"]).unwrap();

    assert_eq!(outcome.paths, vec!["a.txt", "dir/b.txt"]);
    assert_eq!(commit_count(&ctx.storage_dir), 2);
    assert!(is_symlink(&ctx.project_root.join("a.txt")));
    assert!(is_symlink(&ctx.project_root.join("dir/b.txt")));
    assert!(outcome.message().starts_with("Tracking 2 paths privately"));

    let subject = git_stdout(&ctx.storage_dir, &["log", "-1", "--format=%s"]);
    assert_eq!(subject, "Track 2 paths\n");
}

#[test]
fn test_add_records_event() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");

    let outcome = add(&ctx, &["a.txt"]).unwrap();

    let events = read_events(&ctx).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.action, EventAction::Add);
    assert_eq!(last.path.as_deref(), Some("a.txt"));
    assert_eq!(last.details["commit"], outcome.commit.as_str());
}

#[test]
fn test_add_failure_at_each_step_restores_everything() {
    for step in AddStep::ALL {
        let (_temp_dir, ctx) = create_initialized_project();
        write_file(&ctx.project_root, "config/.env", "SECRET=1\n");
        git(&ctx.project_root, &["add", "config/.env"]);
        git(&ctx.project_root, &["commit", "-q", "-m", "Add env"]);
        let before = snapshot(&ctx);

        let err = add_failing_at(&ctx, &["config/.env"], step).unwrap_err();

        assert!(err.to_string().contains("injected failure"), "{}", step);
        assert_eq!(snapshot(&ctx), before, "state differs after failing at {}", step);
        let path = ctx.project_root.join("config/.env");
        assert!(!is_symlink(&path), "{}", step);
        assert_eq!(fs::read_to_string(&path).unwrap(), "SECRET=1\n");
        assert!(!ctx.storage_dir.join("config").exists(), "{}", step);
        assert_eq!(backups_left(&ctx), 0, "{}", step);

        let events = read_events(&ctx).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.action, EventAction::Rollback);
        assert_eq!(last.details["step"], step.to_string());
        assert!(last.details["secondaryFailures"].as_array().unwrap().is_empty());
    }
}

#[test]
fn test_add_failure_restores_staged_changes() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "app.cfg", "v1");
    git(&ctx.project_root, &["add", "app.cfg"]);
    git(&ctx.project_root, &["commit", "-q", "-m", "Add cfg"]);
    write_file(&ctx.project_root, "app.cfg", "v2");
    git(&ctx.project_root, &["add", "app.cfg"]);
    let before = snapshot(&ctx);
    assert!(before.main_status.contains("M  app.cfg"));

    add_failing_at(&ctx, &["app.cfg"], AddStep::CommitPrivate).unwrap_err();

    assert_eq!(snapshot(&ctx), before);
}

#[test]
fn test_add_failure_restores_exact_index_of_directory() {
    let (_temp_dir, ctx) = create_initialized_project();
    let root = &ctx.project_root;
    write_file(root, "keys/a.pem", "v1\n");
    let gitignore = fs::read_to_string(ctx.gitignore_path()).unwrap();
    fs::write(ctx.gitignore_path(), format!("{}*.log\n", gitignore)).unwrap();
    git(root, &["add", ".gitignore", "keys/a.pem"]);
    git(root, &["commit", "-q", "-m", "Add keys"]);
    write_file(root, "keys/a.pem", "v2\n");
    git(root, &["add", "keys/a.pem"]);
    write_file(root, "keys/debug.log", "noise\n");
    write_file(root, "keys/new.pem", "fresh\n");
    let before = snapshot(&ctx);

    add_failing_at(&ctx, &["keys"], AddStep::CommitPrivate).unwrap_err();

    assert_eq!(snapshot(&ctx), before);
    let index = git_stdout(root, &["ls-files", "--", "keys"]);
    assert_eq!(index, "keys/a.pem\n");
    assert_eq!(fs::read_to_string(root.join("keys/debug.log")).unwrap(), "noise\n");
}

#[test]
fn test_add_failure_keeps_partially_staged_blob() {
    let (_temp_dir, ctx) = create_initialized_project();
    let root = &ctx.project_root;
    write_file(root, "app.cfg", "v1");
    git(root, &["add", "app.cfg"]);
    git(root, &["commit", "-q", "-m", "Add cfg"]);
    write_file(root, "app.cfg", "v2");
    git(root, &["add", "app.cfg"]);
    write_file(root, "app.cfg", "v3");
    let before = snapshot(&ctx);
    assert!(before.main_status.contains("MM app.cfg"));

    add_failing_at(&ctx, &["app.cfg"], AddStep::CreateSymlink).unwrap_err();

    assert_eq!(snapshot(&ctx), before);
    assert_eq!(git_stdout(root, &["show", ":app.cfg"]), "v2");
    assert_eq!(fs::read_to_string(root.join("app.cfg")).unwrap(), "v3");
}

#[test]
fn test_add_batch_failure_rolls_back_every_path() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");
    write_file(&ctx.project_root, "nested/dir/b.txt", "b");
    let before = snapshot(&ctx);

    add_failing_at(&ctx, &["a.txt", "nested/dir/b.txt"], AddStep::StagePrivate).unwrap_err();

    assert_eq!(snapshot(&ctx), before);
    assert!(!is_symlink(&ctx.project_root.join("a.txt")));
    assert!(!is_symlink(&ctx.project_root.join("nested/dir/b.txt")));
    assert!(!ctx.storage_dir.join("nested").exists());
}

#[test]
fn test_add_rejects_already_tracked_path() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");
    add(&ctx, &["a.txt"]).unwrap();
    let before = snapshot(&ctx);

    let err = add(&ctx, &["a.txt"]).unwrap_err();

    assert!(matches!(err, PgitError::AlreadyTracked(ref p) if p == "a.txt"));
    assert_eq!(err.kind(), ErrorKind::AlreadyTracked);
    assert_eq!(snapshot(&ctx), before);
}

#[test]
fn test_add_rejects_unsafe_paths_before_touching_anything() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "node_modules/pkg/index.js", "x");
    let before = snapshot(&ctx);

    for raw in [
        "../outside.txt",
        "/etc/passwd",
        "bad\0name",
        "node_modules/pkg/index.js",
        ".private-storage/x",
        "a|b",
        "missing.txt",
    ] {
        let err = add(&ctx, &[raw]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", raw);
    }
    assert_eq!(snapshot(&ctx), before);
}

#[cfg(unix)]
#[test]
fn test_add_rejects_existing_symlink() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "real.txt", "x");
    std::os::unix::fs::symlink("real.txt", ctx.project_root.join("alias.txt")).unwrap();

    let err = add(&ctx, &["alias.txt"]).unwrap_err();

    assert!(err.to_string().contains("symbolic link"));
}

#[cfg(unix)]
#[test]
fn test_add_rejects_path_escaping_through_symlinked_parent() {
    let (_temp_dir, ctx) = create_initialized_project();
    let outside = tempfile::TempDir::new().unwrap();
    write_file(outside.path(), "secret.txt", "x");
    std::os::unix::fs::symlink(outside.path(), ctx.project_root.join("linked")).unwrap();

    let err = add(&ctx, &["linked/secret.txt"]).unwrap_err();

    assert!(err.to_string().contains("outside the project"));
    assert!(outside.path().join("secret.txt").is_file());
}

#[test]
fn test_add_batch_too_large_fails_before_validation() {
    let (_temp_dir, ctx) = create_initialized_project();
    let paths: Vec<String> = (0..=MAX_BATCH_SIZE).map(|i| format!("f{}.txt", i)).collect();

    let err = run(&ctx, &Capabilities::detect(), paths.as_slice(), &AddOptions::default()).unwrap_err();

    assert!(matches!(err, PgitError::BatchTooLarge { size: 101, max: 100 }));
}

#[test]
fn test_add_batch_is_all_or_nothing() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");
    let before = snapshot(&ctx);

    let err = add(&ctx, &["a.txt", "missing.txt"]).unwrap_err();
    assert!(matches!(err, PgitError::InvalidPath { ref path, .. } if path == "missing.txt"));

    let err = add(&ctx, &["a.txt", "missing.txt", "../x"]).unwrap_err();
    assert!(matches!(err, PgitError::InvalidInput(_)));
    let message = err.to_string();
    assert!(message.contains("2 of 3 paths were rejected"), "{}", message);
    assert!(message.contains("missing.txt"));
    assert!(message.contains("../x"));

    assert_eq!(snapshot(&ctx), before);
    assert!(!is_symlink(&ctx.project_root.join("a.txt")));
}

#[test]
fn test_add_batch_rejects_duplicates_and_nesting() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "config/.env", "x");

    let err = add(&ctx, &["config/.env", "./config/.env"]).unwrap_err();
    assert!(err.to_string().contains("listed more than once"));

    let err = add(&ctx, &["config", "config/.env"]).unwrap_err();
    assert!(err.to_string().contains("overlaps 'config'"));

    add(&ctx, &["config/.env"]).unwrap();
    let err = add(&ctx, &["config"]).unwrap_err();
    assert!(err.to_string().contains("overlaps tracked path 'config/.env'"));
}

#[test]
fn test_add_requires_paths() {
    let (_temp_dir, ctx) = create_initialized_project();

    let err = add(&ctx, &[]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_add_requires_initialized_project() {
    let temp_dir = create_test_repo();
    let ctx = ProjectContext::resolve_from(temp_dir.path()).unwrap();
    write_file(&ctx.project_root, "a.txt", "a");

    let err = add(&ctx, &["a.txt"]).unwrap_err();

    assert!(matches!(err, PgitError::NotInitialized(_)));
}

#[test]
fn test_add_requires_symlink_support() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");

    let err = run(
        &ctx,
        &Capabilities::without_symlinks(),
        &["a.txt"],
        &AddOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, PgitError::UnsupportedPlatform(_)));
    assert!(!is_symlink(&ctx.project_root.join("a.txt")));
}

#[test]
fn test_add_requires_private_repository() {
    let (_temp_dir, ctx) = create_initialized_project();
    write_file(&ctx.project_root, "a.txt", "a");
    fs::remove_dir_all(ctx.storage_dir.join(".git")).unwrap();

    let err = add(&ctx, &["a.txt"]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Environment);
    assert!(!is_symlink(&ctx.project_root.join("a.txt")));
}
