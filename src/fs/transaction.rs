//! Reversible filesystem mutations.
//!
//! An [`FsTransaction`] performs moves, writes and removals while recording an
//! undo entry for each. [`FsTransaction::rollback`] replays those entries in
//! reverse. A failure inside a single call is reversed before the call
//! returns, so callers only ever see completed operations on the stack.

use super::atomic::atomic_write_owner_only;
use super::move_file::{copy_path, move_path, prune_empty_dirs, remove_path};
use super::validation::{PathPolicy, validate_path_string};
use crate::error::{PgitError, Result};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker embedded in every backup artifact name.
pub const BACKUP_MARKER: &str = ".backup-";

/// Delays between attempts while a move destination still exists.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
];

/// Whether a file name was produced by the backup naming scheme.
pub fn is_backup_artifact(name: &str) -> bool {
    name.contains(BACKUP_MARKER)
}

/// What a completed [`FsTransaction::move_atomic`] changed besides the move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveRecord {
    /// Parent directories created for the target, outermost first.
    pub created_dirs: Vec<PathBuf>,
}

#[derive(Debug)]
enum Preserved {
    Backup(PathBuf),
    Contents(Vec<u8>),
    Absent,
}

#[derive(Debug)]
enum UndoEntry {
    Move {
        source: PathBuf,
        target: PathBuf,
        backup: Option<PathBuf>,
        created_dirs: Vec<PathBuf>,
    },
    Write {
        path: PathBuf,
        previous: Preserved,
        created_dirs: Vec<PathBuf>,
    },
    Remove {
        path: PathBuf,
        backup: PathBuf,
    },
}

#[derive(Debug)]
pub struct FsTransaction {
    undo: Vec<UndoEntry>,
    backup_dir: Option<PathBuf>,
    create_backups: bool,
    policy: PathPolicy,
}

impl Default for FsTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl FsTransaction {
    pub fn new() -> Self {
        Self {
            undo: Vec::new(),
            backup_dir: None,
            create_backups: true,
            policy: PathPolicy::default(),
        }
    }

    /// Place backups in `dir` instead of next to the source.
    pub fn with_backup_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Toggle pre-move backup copies. Removals always keep a backup.
    pub fn with_backups(mut self, create_backups: bool) -> Self {
        self.create_backups = create_backups;
        self
    }

    pub fn with_policy(mut self, policy: PathPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of recorded undo entries.
    pub fn pending(&self) -> usize {
        self.undo.len()
    }

    /// Move `source` to `target`, keeping a backup of `source` until the move
    /// is confirmed.
    pub fn move_atomic(&mut self, source: &Path, target: &Path) -> Result<MoveRecord> {
        self.validate(source)?;
        self.validate(target)?;

        if fs::symlink_metadata(source).is_err() {
            return Err(PgitError::FileNotFound(source.to_path_buf()));
        }

        let mark = self.undo.len();
        let created_dirs = create_parent_dirs(target)?;

        let backup = if self.create_backups {
            match self.backup_copy(source) {
                Ok(backup) => Some(backup),
                Err(e) => {
                    prune_empty_dirs(&created_dirs);
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.undo.push(UndoEntry::Move {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            backup,
            created_dirs: created_dirs.clone(),
        });

        if let Err(e) = move_with_retry(source, target) {
            self.unwind_to(mark);
            return Err(e);
        }

        if let Some(UndoEntry::Move { backup, .. }) = self.undo.last_mut()
            && let Some(backup) = backup.take()
            && let Err(e) = remove_path(&backup)
        {
            warn!(backup = %backup.display(), error = %e, "failed to delete move backup");
        }

        debug!(source = %source.display(), target = %target.display(), "moved");
        Ok(MoveRecord { created_dirs })
    }

    /// Atomically replace the content of `path` (mode 0600 on unix).
    pub fn write_atomic(&mut self, path: &Path, content: &[u8]) -> Result<()> {
        self.validate(path)?;

        let mark = self.undo.len();
        let created_dirs = create_parent_dirs(path)?;

        let previous = if fs::symlink_metadata(path).is_err() {
            Preserved::Absent
        } else if self.create_backups {
            Preserved::Backup(self.backup_copy(path)?)
        } else {
            Preserved::Contents(fs::read(path).map_err(|e| {
                PgitError::from_io(e, format!("failed to read '{}'", path.display()))
            })?)
        };

        self.undo.push(UndoEntry::Write {
            path: path.to_path_buf(),
            previous,
            created_dirs,
        });

        if let Err(e) = atomic_write_owner_only(path, content) {
            self.unwind_to(mark);
            return Err(e);
        }

        debug!(path = %path.display(), bytes = content.len(), "wrote");
        Ok(())
    }

    /// Delete `path`. The content is kept as a backup until the transaction
    /// is cleared.
    pub fn remove(&mut self, path: &Path) -> Result<()> {
        self.validate(path)?;

        if fs::symlink_metadata(path).is_err() {
            return Err(PgitError::FileNotFound(path.to_path_buf()));
        }

        let backup = self.backup_path_for(path)?;
        move_path(path, &backup)?;
        self.undo.push(UndoEntry::Remove {
            path: path.to_path_buf(),
            backup,
        });

        debug!(path = %path.display(), "removed");
        Ok(())
    }

    /// Undo every recorded operation in reverse order.
    ///
    /// Returns descriptions of undo steps that failed; the remaining steps
    /// are still attempted.
    pub fn rollback(&mut self) -> Vec<String> {
        self.unwind_to(0)
    }

    /// Forget the recorded operations without undoing them, deleting any
    /// backups they still hold.
    pub fn clear_rollback_actions(&mut self) {
        for entry in self.undo.drain(..) {
            let backup = match entry {
                UndoEntry::Move { backup, .. } => backup,
                UndoEntry::Write {
                    previous: Preserved::Backup(backup),
                    ..
                } => Some(backup),
                UndoEntry::Write { .. } => None,
                UndoEntry::Remove { backup, .. } => Some(backup),
            };

            if let Some(backup) = backup
                && let Err(e) = remove_path(&backup)
            {
                warn!(backup = %backup.display(), error = %e, "failed to delete backup");
            }
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        validate_path_string(&path.to_string_lossy(), &self.policy)
    }

    fn unwind_to(&mut self, mark: usize) -> Vec<String> {
        let mut failures = Vec::new();
        while self.undo.len() > mark {
            let Some(entry) = self.undo.pop() else {
                break;
            };
            if let Err(e) = undo(entry) {
                warn!(error = %e, "filesystem undo step failed");
                failures.push(e.to_string());
            }
        }
        failures
    }

    fn backup_copy(&self, source: &Path) -> Result<PathBuf> {
        let backup = self.backup_path_for(source)?;
        copy_path(source, &backup)?;
        Ok(backup)
    }

    fn backup_path_for(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PgitError::InvalidPath {
                path: source.display().to_string(),
                reason: "path has no file name".to_string(),
            })?;

        let dir = match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => source.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to create backup directory '{}'", dir.display()),
            )
        })?;

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        Ok(dir.join(format!(
            "{}{}{}-{}",
            name,
            BACKUP_MARKER,
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            suffix
        )))
    }
}

fn undo(entry: UndoEntry) -> Result<()> {
    match entry {
        UndoEntry::Move {
            source,
            target,
            backup,
            created_dirs,
        } => {
            if fs::symlink_metadata(&target).is_ok() && fs::symlink_metadata(&source).is_err() {
                move_path(&target, &source)?;
            } else if let Some(backup) = &backup
                && fs::symlink_metadata(&source).is_err()
            {
                move_path(backup, &source)?;
            }
            if let Some(backup) = backup {
                remove_path(&backup)?;
            }
            prune_empty_dirs(&created_dirs);
            Ok(())
        }
        UndoEntry::Write {
            path,
            previous,
            created_dirs,
        } => {
            match previous {
                Preserved::Backup(backup) => move_path(&backup, &path)?,
                Preserved::Contents(content) => atomic_write_owner_only(&path, &content)?,
                Preserved::Absent => remove_path(&path)?,
            }
            prune_empty_dirs(&created_dirs);
            Ok(())
        }
        UndoEntry::Remove { path, backup } => move_path(&backup, &path),
    }
}

fn move_with_retry(source: &Path, target: &Path) -> Result<()> {
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        if fs::symlink_metadata(target).is_err() {
            return move_path(source, target);
        }
        debug!(
            attempt = attempt + 1,
            target = %target.display(),
            "move destination still exists, backing off"
        );
        thread::sleep(*delay);
    }

    if fs::symlink_metadata(target).is_err() {
        return move_path(source, target);
    }

    Err(PgitError::Filesystem(format!(
        "cannot move '{}': destination '{}' already exists",
        source.display(),
        target.display()
    )))
}

/// Create the missing ancestors of `path`, returning them outermost first.
fn create_parent_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(parent) = path.parent() else {
        return Ok(Vec::new());
    };

    let mut missing: Vec<PathBuf> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    if let Err(e) = fs::create_dir_all(parent) {
        prune_empty_dirs(&missing);
        return Err(PgitError::from_io(
            e,
            format!("failed to create directory '{}'", parent.display()),
        ));
    }

    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn move_atomic_moves_and_deletes_backup() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join("backups");
        let source = temp.path().join("secret.env");
        fs::write(&source, "KEY=1").unwrap();
        let target = temp.path().join("storage/config/secret.env");

        let mut tx = FsTransaction::new().with_backup_dir(&backups);
        let record = tx.move_atomic(&source, &target).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "KEY=1");
        assert_eq!(
            record.created_dirs,
            vec![temp.path().join("storage"), temp.path().join("storage/config")]
        );
        assert!(entries(&backups).is_empty());
        assert_eq!(tx.pending(), 1);
    }

    #[test]
    fn move_atomic_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let mut tx = FsTransaction::new();

        let err = tx
            .move_atomic(&temp.path().join("missing"), &temp.path().join("dest"))
            .unwrap_err();

        assert!(matches!(err, PgitError::FileNotFound(_)));
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn move_atomic_existing_destination_fails_after_retries_and_undoes() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join("backups");
        let source = temp.path().join("a.txt");
        let target = temp.path().join("out/b.txt");
        fs::write(&source, "a").unwrap();
        fs::create_dir_all(temp.path().join("out")).unwrap();
        fs::write(&target, "b").unwrap();

        let mut tx = FsTransaction::new().with_backup_dir(&backups);
        let err = tx.move_atomic(&source, &target).unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&source).unwrap(), "a");
        assert_eq!(fs::read_to_string(&target).unwrap(), "b");
        assert!(entries(&backups).is_empty());
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn rollback_moves_content_back_and_prunes_dirs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("dir");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("f.txt"), "f").unwrap();
        let target = temp.path().join("storage/nested/dir");

        let mut tx = FsTransaction::new().with_backup_dir(temp.path().join("backups"));
        tx.move_atomic(&source, &target).unwrap();

        let failures = tx.rollback();

        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(fs::read_to_string(source.join("f.txt")).unwrap(), "f");
        assert!(!temp.path().join("storage").exists());
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn write_atomic_rollback_restores_previous_content() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join("backups");
        let path = temp.path().join("config.json");
        fs::write(&path, "old").unwrap();

        let mut tx = FsTransaction::new().with_backup_dir(&backups);
        tx.write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");

        assert!(tx.rollback().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(entries(&backups).is_empty());
    }

    #[test]
    fn write_atomic_without_backups_restores_from_memory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "old").unwrap();

        let mut tx = FsTransaction::new().with_backups(false);
        tx.write_atomic(&path, b"new").unwrap();
        assert_eq!(entries(temp.path()), vec!["config.json"]);

        assert!(tx.rollback().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    }

    #[test]
    fn write_atomic_rollback_removes_new_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("new/file.txt");

        let mut tx = FsTransaction::new();
        tx.write_atomic(&path, b"x").unwrap();
        assert!(tx.rollback().is_empty());

        assert!(!path.exists());
        assert!(!temp.path().join("new").exists());
    }

    #[test]
    fn remove_and_rollback_restores() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join("backups");
        let path = temp.path().join("victim.txt");
        fs::write(&path, "v").unwrap();

        let mut tx = FsTransaction::new().with_backup_dir(&backups);
        tx.remove(&path).unwrap();
        assert!(!path.exists());

        assert!(tx.rollback().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "v");
    }

    #[test]
    fn clear_discards_stack_and_backups() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join("backups");
        let path = temp.path().join("victim.txt");
        let written = temp.path().join("written.txt");
        fs::write(&path, "v").unwrap();
        fs::write(&written, "w").unwrap();

        let mut tx = FsTransaction::new().with_backup_dir(&backups);
        tx.remove(&path).unwrap();
        tx.write_atomic(&written, b"w2").unwrap();
        assert_eq!(entries(&backups).len(), 2);

        tx.clear_rollback_actions();

        assert_eq!(tx.pending(), 0);
        assert!(entries(&backups).is_empty());
        assert!(tx.rollback().is_empty());
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&written).unwrap(), "w2");
    }

    #[test]
    fn rollback_reverses_in_order() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        fs::write(&a, "a").unwrap();
        let b = temp.path().join("b.txt");
        let c = temp.path().join("c.txt");

        let mut tx = FsTransaction::new().with_backups(false);
        tx.move_atomic(&a, &b).unwrap();
        tx.move_atomic(&b, &c).unwrap();

        assert!(tx.rollback().is_empty());
        assert_eq!(fs::read_to_string(&a).unwrap(), "a");
        assert!(!b.exists());
        assert!(!c.exists());
    }

    #[test]
    fn rejects_invalid_paths_before_touching_disk() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "a").unwrap();

        let mut tx = FsTransaction::new();
        let err = tx
            .move_atomic(&source, &temp.path().join("node_modules/a.txt"))
            .unwrap_err();

        assert!(matches!(err, PgitError::InvalidPath { .. }));
        assert!(source.exists());
        assert!(!temp.path().join("node_modules").exists());
    }

    #[test]
    fn backup_names_carry_marker() {
        let temp = TempDir::new().unwrap();
        let tx = FsTransaction::new().with_backup_dir(temp.path());
        let backup = tx.backup_path_for(Path::new("/x/secret.env")).unwrap();
        let name = backup.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("secret.env.backup-"));
        assert!(is_backup_artifact(name));
        assert!(!is_backup_artifact("secret.env"));
    }
}
