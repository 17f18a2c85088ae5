//! Implementation of the `pgit init` command.
//!
//! # What `pgit init` does
//!
//! 1. Verifies the project is a git repository that is not yet initialized
//!    and that the platform supports symbolic links
//! 2. Creates the marker directory `.git-private/` (with `backups/`)
//! 3. Creates `.private-storage/` as a new repository on branch `main`,
//!    copying the author identity from the main repository
//! 4. Creates an empty initial commit so HEAD resolves
//! 5. Writes `.private-config.json`
//! 6. Adds the pgit paths to the main `.gitignore`
//! 7. Appends an `init` event
//!
//! A failure in steps 2-6 removes everything init created.

mod transaction;


use super::Report;
use super::ignore::append_missing_lines;
use crate::config::{ConfigStore, CreateOptions, SettingsOverrides};
use crate::context::{ProjectContext, REQUIRED_IGNORE_ENTRIES};
use crate::error::{PgitError, Result};
use crate::events::{self, Event, EventAction};
use crate::git::GitRepository;
use crate::platform::Capabilities;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use transaction::InitTransaction;

/// Git settings copied from the main repository into private storage.
const COPIED_GIT_SETTINGS: &[&str] = &["user.name", "user.email", "commit.gpgsign"];

const INITIAL_COMMIT_MESSAGE: &str = "Initialize private storage";

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub project_name: Option<String>,
    pub settings: SettingsOverrides,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutcome {
    pub project_root: PathBuf,
    pub storage_dir: PathBuf,
    pub marker_dir: PathBuf,
    pub initial_commit: String,
    pub ignore_entries_added: Vec<String>,
}

impl Report for InitOutcome {
    fn message(&self) -> String {
        format!(
            "Initialized private tracking in {}\n\nPrivate storage: {}\nInitial commit:  {}\n\n\
             Track files with `pgit add <path>`.",
            self.project_root.display(),
            self.storage_dir.display(),
            self.initial_commit
        )
    }
}

pub fn run(ctx: &ProjectContext, capabilities: &Capabilities, options: &InitOptions) -> Result<InitOutcome> {
    let main = GitRepository::new(&ctx.project_root);
    main.ensure_repository()?;

    if ctx.config_path.exists() {
        return Err(PgitError::AlreadyInitialized(ctx.config_path.clone()));
    }

    if !capabilities.supports_symlinks {
        return Err(PgitError::UnsupportedPlatform(format!(
            "{} does not support symbolic links; private tracking needs them",
            capabilities.platform_name
        )));
    }

    if ctx.storage_dir.exists() {
        return Err(PgitError::Environment(format!(
            "'{}' already exists but pgit is not initialized.\n\n\
             Move it aside and run `pgit init` again.",
            ctx.storage_dir.display()
        )));
    }

    let mut tx = InitTransaction::new();
    match scaffold(ctx, &main, options, &mut tx) {
        Ok(outcome) => {
            events::record(
                ctx,
                Event::new(EventAction::Init).with_details(json!({
                    "storage": ctx.storage_dir.display().to_string(),
                    "initial_commit": outcome.initial_commit,
                })),
            );
            Ok(outcome)
        }
        Err(e) => {
            tx.rollback();
            Err(e)
        }
    }
}

fn scaffold(
    ctx: &ProjectContext,
    main: &GitRepository,
    options: &InitOptions,
    tx: &mut InitTransaction,
) -> Result<InitOutcome> {
    if !ctx.marker_dir.exists() {
        create_dir(&ctx.marker_dir)?;
        tx.created_dirs.push(ctx.marker_dir.clone());
    }
    create_dir(&ctx.backups_dir())?;

    tx.created_dirs.push(ctx.storage_dir.clone());
    let private = GitRepository::init(&ctx.storage_dir)?;

    for key in COPIED_GIT_SETTINGS {
        if let Some(value) = main.config_value(key)? {
            private.set_config_value(key, &value)?;
        }
    }

    let initial_commit = private.commit_initial(INITIAL_COMMIT_MESSAGE)?;
    debug!(commit = %initial_commit, "created initial private commit");

    tx.config_written = Some(ctx.config_path.clone());
    ConfigStore::new(ctx).create(
        &ctx.project_root,
        CreateOptions {
            project_name: options.project_name.clone(),
            settings: options.settings,
        },
    )?;

    let ignore_entries_added = append_missing_lines(&ctx.gitignore_path(), REQUIRED_IGNORE_ENTRIES)?;

    Ok(InitOutcome {
        project_root: ctx.project_root.clone(),
        storage_dir: ctx.storage_dir.clone(),
        marker_dir: ctx.marker_dir.clone(),
        initial_commit,
        ignore_entries_added,
    })
}

fn create_dir(path: &std::path::Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        PgitError::from_io(e, format!("failed to create directory '{}'", path.display()))
    })
}
