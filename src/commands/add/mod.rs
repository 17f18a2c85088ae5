//! Implementation of the `pgit add` command.
//!
//! # What `pgit add <path>...` does
//!
//! 1. Checks the environment: configuration loads, symlinks are supported and
//!    private storage is a repository
//! 2. Validates every path (safety, existence, not yet tracked, no overlap)
//! 3. Records whether each path is tracked or staged in the main repository
//! 4. For each path: removes it from the main index, moves it into private
//!    storage and leaves a relative symlink behind (plus an `info/exclude`
//!    entry when `autoGitignore` is on)
//! 5. Stages the batch in private storage, records it in the configuration
//!    and commits it there
//!
//! Steps 1-3 change nothing. If any part of 4-5 fails, every completed part
//! is undone in reverse order and a `rollback` event is appended.

mod pipeline;
mod rollback;
mod validation;

#[cfg(test)]
mod tests;

use super::{Report, open_config};
use crate::context::ProjectContext;
use crate::error::{PgitError, Result};
use crate::events::{self, Event, EventAction};
use crate::git::RepositoryPair;
use crate::platform::Capabilities;
use crate::symlink::SymlinkManager;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

pub use pipeline::AddStep;
use pipeline::{OriginalState, Pipeline, PlannedPath};
use validation::validate_batch;

/// Most paths accepted by one invocation.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Inject a failure when the pipeline enters this step.
    #[cfg(test)]
    pub(crate) fail_at: Option<AddStep>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub paths: Vec<String>,
    /// Private commit that recorded the paths.
    pub commit: String,
}

impl Report for AddOutcome {
    fn message(&self) -> String {
        let short = self.commit.get(..7).unwrap_or(&self.commit);
        match self.paths.as_slice() {
            [single] => format!("Tracking '{}' privately (commit {})", single, short),
            paths => format!(
                "Tracking {} paths privately (commit {}):\n{}",
                paths.len(),
                short,
                paths
                    .iter()
                    .map(|p| format!("  {}", p))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }
}

pub fn run<S: AsRef<str>>(
    ctx: &ProjectContext,
    capabilities: &Capabilities,
    paths: &[S],
    options: &AddOptions,
) -> Result<AddOutcome> {
    if paths.is_empty() {
        return Err(PgitError::InvalidInput(
            "no paths given.\n\nUsage: pgit add <path>...".to_string(),
        ));
    }
    if paths.len() > MAX_BATCH_SIZE {
        return Err(PgitError::BatchTooLarge {
            size: paths.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    let (mut store, config) = open_config(ctx)?;
    if !capabilities.supports_symlinks {
        return Err(PgitError::UnsupportedPlatform(format!(
            "{} does not support symbolic links",
            capabilities.platform_name
        )));
    }
    let pair = RepositoryPair::new(ctx);
    if !pair.storage_root().is_dir() {
        return Err(PgitError::Environment(format!(
            "private storage '{}' is missing.\n\nRun `pgit cleanup` or re-initialize.",
            pair.storage_root().display()
        )));
    }
    pair.private.ensure_repository()?;

    let validated = validate_batch(ctx, &config, paths).into_result()?;

    let main_status = pair.main.status()?;
    let mut planned = Vec::with_capacity(validated.len());
    for path in validated {
        let index_entries = pair.main.index_entries(&path.relative)?;
        let original = OriginalState {
            tracked: !index_entries.is_empty(),
            staged: main_status.entries_for(&path.relative).any(|f| f.is_staged()),
            index_entries,
        };
        debug!(path = %path.relative, tracked = original.tracked, staged = original.staged, "planned add");
        planned.push(PlannedPath { path, original });
    }

    let symlinks = SymlinkManager::new(capabilities);
    let pipeline = Pipeline::new(ctx, &pair, &mut store, &symlinks, &config.settings);
    #[cfg(test)]
    let pipeline = pipeline.fail_at(options.fail_at);
    #[cfg(not(test))]
    let _ = options;

    let added: Vec<String> = planned.iter().map(|p| p.path.relative.clone()).collect();
    match pipeline.execute(&planned) {
        Ok(commit) => {
            let mut event = Event::new(EventAction::Add).with_details(json!({
                "paths": added,
                "commit": commit,
            }));
            if let [single] = added.as_slice() {
                event = event.with_path(single.clone());
            }
            events::record(ctx, event);
            Ok(AddOutcome {
                paths: added,
                commit,
            })
        }
        Err(failure) => {
            if !failure.secondary_failures.is_empty() {
                warn!(
                    count = failure.secondary_failures.len(),
                    "rollback left changes behind; run `pgit cleanup`"
                );
            }
            events::record(
                ctx,
                Event::new(EventAction::Rollback).with_details(json!({
                    "operation": "add",
                    "paths": added,
                    "error": failure.error.to_string(),
                    "step": failure.step.map(|s| s.to_string()),
                    "undone": failure.undone,
                    "secondaryFailures": failure.secondary_failures,
                })),
            );
            Err(failure.error)
        }
    }
}
