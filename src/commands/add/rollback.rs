//! Compensating actions for the add pipeline.
//!
//! Each successful pipeline step pushes exactly one [`RollbackAction`]. On
//! failure the stack is unwound newest-first; a failing compensation is
//! logged and the unwind continues with the next one.

use crate::config::ConfigStore;
use crate::error::Result;
use crate::fs::{atomic_write, move_path, prune_empty_dirs, remove_path};
use crate::git::RepositoryPair;
use crate::symlink::SymlinkManager;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub(crate) enum RollbackAction {
    /// Put back the main index entries recorded for a path before it was
    /// removed from the index.
    RestoreMainIndex { path: String, entries: Vec<u8> },
    /// Move relocated content from storage back to its original place.
    MoveBack {
        from: PathBuf,
        to: PathBuf,
        created_dirs: Vec<PathBuf>,
    },
    RemoveSymlink { link: PathBuf },
    /// Restore the exclude file as it was before `entry` was appended.
    RemoveExcludeEntry {
        exclude_file: PathBuf,
        entry: String,
        previous: Option<Vec<u8>>,
    },
    UnstagePrivate { paths: Vec<String> },
    /// Write back the configuration bytes captured before the save.
    RestoreConfig { snapshot: Vec<u8> },
}

/// What compensations need to act on.
pub(crate) struct RollbackTargets<'a> {
    pub pair: &'a RepositoryPair,
    pub store: &'a mut ConfigStore,
    pub symlinks: &'a SymlinkManager,
}

impl RollbackAction {
    pub fn describe(&self) -> String {
        match self {
            RollbackAction::RestoreMainIndex { path, .. } => {
                format!("restore '{}' in the main index", path)
            }
            RollbackAction::MoveBack { to, .. } => format!("move '{}' back", to.display()),
            RollbackAction::RemoveSymlink { link } => {
                format!("remove symlink '{}'", link.display())
            }
            RollbackAction::RemoveExcludeEntry { entry, .. } => {
                format!("remove exclude entry '{}'", entry)
            }
            RollbackAction::UnstagePrivate { paths } => {
                format!("unstage {} path(s) in private storage", paths.len())
            }
            RollbackAction::RestoreConfig { .. } => "restore configuration".to_string(),
        }
    }

    fn execute(&self, targets: &mut RollbackTargets<'_>) -> Result<()> {
        match self {
            RollbackAction::RestoreMainIndex { path, entries } => {
                targets.pair.main.restore_index_entries(path, entries)
            }
            RollbackAction::MoveBack {
                from,
                to,
                created_dirs,
            } => {
                move_path(from, to)?;
                prune_empty_dirs(created_dirs);
                Ok(())
            }
            RollbackAction::RemoveSymlink { link } => targets.symlinks.remove(link),
            RollbackAction::RemoveExcludeEntry {
                exclude_file,
                previous,
                ..
            } => match previous {
                Some(content) => atomic_write(exclude_file, content),
                None => remove_path(exclude_file),
            },
            RollbackAction::UnstagePrivate { paths } => targets.pair.private.unstage(paths.as_slice()),
            RollbackAction::RestoreConfig { snapshot } => targets.store.restore_raw(snapshot),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RollbackStack {
    actions: Vec<RollbackAction>,
}

impl RollbackStack {
    pub fn push(&mut self, action: RollbackAction) {
        debug!(action = %action.describe(), "recorded rollback action");
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Execute every action newest-first, emptying the stack. Returns the
    /// descriptions of compensations that failed.
    pub fn unwind(&mut self, targets: &mut RollbackTargets<'_>) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(action) = self.actions.pop() {
            match action.execute(targets) {
                Ok(()) => debug!(action = %action.describe(), "rolled back"),
                Err(e) => {
                    warn!(action = %action.describe(), error = %e, "rollback step failed");
                    failures.push(format!("{}: {}", action.describe(), e));
                }
            }
        }
        failures
    }
}
