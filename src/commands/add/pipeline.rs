//! The mutating half of `pgit add`.
//!
//! Steps a-c run once per path, d-f once for the whole batch. After each
//! successful step the matching [`RollbackAction`] is pushed; on failure the
//! stack is unwound newest-first.

use super::rollback::{RollbackAction, RollbackStack, RollbackTargets};
use super::validation::ValidatedPath;
use crate::commands::ignore::{append_missing_lines, exclude_entry};
use crate::config::{ConfigStore, Settings};
use crate::context::ProjectContext;
use crate::error::{PgitError, Result};
use crate::fs::{FsTransaction, PathPolicy};
use crate::git::RepositoryPair;
use crate::symlink::{LinkOptions, SymlinkManager};
use std::fmt;
use std::fs;
use tracing::debug;

/// One step of the add pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStep {
    UntrackFromMain,
    MoveToStorage,
    CreateSymlink,
    StagePrivate,
    RecordConfig,
    CommitPrivate,
}

impl AddStep {
    pub const ALL: [AddStep; 6] = [
        AddStep::UntrackFromMain,
        AddStep::MoveToStorage,
        AddStep::CreateSymlink,
        AddStep::StagePrivate,
        AddStep::RecordConfig,
        AddStep::CommitPrivate,
    ];
}

impl fmt::Display for AddStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddStep::UntrackFromMain => "untrack_from_main",
            AddStep::MoveToStorage => "move_to_storage",
            AddStep::CreateSymlink => "create_symlink",
            AddStep::StagePrivate => "stage_private",
            AddStep::RecordConfig => "record_config",
            AddStep::CommitPrivate => "commit_private",
        };
        write!(f, "{}", s)
    }
}

/// State of a path in the main repository before the pipeline touched it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OriginalState {
    pub tracked: bool,
    pub staged: bool,
    /// Raw `ls-files --stage -z` records under the path.
    pub index_entries: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedPath {
    pub path: ValidatedPath,
    pub original: OriginalState,
}

/// Why the pipeline stopped, and what unwinding it left behind.
#[derive(Debug)]
pub(crate) struct PipelineFailure {
    pub error: PgitError,
    pub step: Option<AddStep>,
    pub undone: usize,
    pub secondary_failures: Vec<String>,
}

pub(crate) struct Pipeline<'a> {
    ctx: &'a ProjectContext,
    pair: &'a RepositoryPair,
    store: &'a mut ConfigStore,
    symlinks: &'a SymlinkManager,
    settings: &'a Settings,
    stack: RollbackStack,
    current: Option<AddStep>,
    fail_at: Option<AddStep>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a ProjectContext,
        pair: &'a RepositoryPair,
        store: &'a mut ConfigStore,
        symlinks: &'a SymlinkManager,
        settings: &'a Settings,
    ) -> Self {
        Self {
            ctx,
            pair,
            store,
            symlinks,
            settings,
            stack: RollbackStack::default(),
            current: None,
            fail_at: None,
        }
    }

    /// Make the pipeline fail as it enters `step`.
    #[cfg(test)]
    pub fn fail_at(mut self, step: Option<AddStep>) -> Self {
        self.fail_at = step;
        self
    }

    /// Run every step and return the private commit id.
    pub fn execute(mut self, planned: &[PlannedPath]) -> std::result::Result<String, PipelineFailure> {
        match self.run_steps(planned) {
            Ok(commit) => Ok(commit),
            Err(error) => {
                let undone = self.stack.len();
                debug!(step = ?self.current, undone, error = %error, "add failed; rolling back");
                let mut targets = RollbackTargets {
                    pair: self.pair,
                    store: self.store,
                    symlinks: self.symlinks,
                };
                let secondary_failures = self.stack.unwind(&mut targets);
                Err(PipelineFailure {
                    error,
                    step: self.current,
                    undone,
                    secondary_failures,
                })
            }
        }
    }

    fn run_steps(&mut self, planned: &[PlannedPath]) -> Result<String> {
        for item in planned {
            self.untrack_from_main(item)?;
            self.move_to_storage(&item.path)?;
            self.create_symlink(&item.path)?;
        }

        let paths: Vec<String> = planned.iter().map(|p| p.path.relative.clone()).collect();
        self.stage_private(&paths)?;
        self.record_config(&paths)?;
        self.commit_private(&paths)
    }

    fn enter(&mut self, step: AddStep) -> Result<()> {
        self.current = Some(step);
        debug!(%step, "add step");
        if self.fail_at == Some(step) {
            return Err(PgitError::Filesystem(format!("injected failure at {}", step)));
        }
        Ok(())
    }

    fn untrack_from_main(&mut self, item: &PlannedPath) -> Result<()> {
        self.enter(AddStep::UntrackFromMain)?;
        if !item.original.tracked {
            return Ok(());
        }

        let rel = item.path.relative.as_str();
        self.pair.main.remove_from_index(&[rel], true)?;
        self.stack.push(RollbackAction::RestoreMainIndex {
            path: rel.to_string(),
            entries: item.original.index_entries.clone(),
        });
        Ok(())
    }

    fn move_to_storage(&mut self, path: &ValidatedPath) -> Result<()> {
        self.enter(AddStep::MoveToStorage)?;

        let target = self.pair.storage_path_for(&path.relative);
        let mut tx = FsTransaction::new()
            .with_backup_dir(self.ctx.backups_dir())
            .with_backups(self.settings.create_backups)
            .with_policy(
                PathPolicy::within(&self.ctx.project_root).allowing(self.pair.storage_root()),
            );
        let record = tx.move_atomic(&path.absolute, &target)?;
        tx.clear_rollback_actions();

        self.stack.push(RollbackAction::MoveBack {
            from: target,
            to: path.absolute.clone(),
            created_dirs: record.created_dirs,
        });
        Ok(())
    }

    fn create_symlink(&mut self, path: &ValidatedPath) -> Result<()> {
        self.enter(AddStep::CreateSymlink)?;

        let target = self.pair.storage_path_for(&path.relative);
        self.symlinks.create(
            &target,
            &path.absolute,
            LinkOptions {
                relative: true,
                is_directory: path.is_dir,
                ..LinkOptions::default()
            },
        )?;
        self.stack.push(RollbackAction::RemoveSymlink {
            link: path.absolute.clone(),
        });

        if self.settings.auto_gitignore {
            let exclude_file = self.pair.main.exclude_file()?;
            let previous = fs::read(&exclude_file).ok();
            let entry = exclude_entry(&path.relative);
            if !append_missing_lines(&exclude_file, &[entry.as_str()])?.is_empty() {
                self.stack.push(RollbackAction::RemoveExcludeEntry {
                    exclude_file,
                    entry,
                    previous,
                });
            }
        }
        Ok(())
    }

    fn stage_private(&mut self, paths: &[String]) -> Result<()> {
        self.enter(AddStep::StagePrivate)?;
        self.pair.private.add_files(paths)?;
        self.stack.push(RollbackAction::UnstagePrivate {
            paths: paths.to_vec(),
        });
        Ok(())
    }

    fn record_config(&mut self, paths: &[String]) -> Result<()> {
        self.enter(AddStep::RecordConfig)?;
        let snapshot = self.store.raw_bytes()?;
        self.store.add_tracked_paths(paths)?;
        self.stack.push(RollbackAction::RestoreConfig { snapshot });
        Ok(())
    }

    fn commit_private(&mut self, paths: &[String]) -> Result<String> {
        self.enter(AddStep::CommitPrivate)?;
        self.pair.private.commit(&commit_message(paths))
    }
}

/// Message for the private commit that records newly tracked paths.
pub(crate) fn commit_message(paths: &[String]) -> String {
    match paths {
        [single] => format!("Track {}", single),
        _ => {
            let list: Vec<String> = paths.iter().map(|p| format!("- {}", p)).collect();
            format!("Track {} paths\n\n{}", paths.len(), list.join("\n"))
        }
    }
}
