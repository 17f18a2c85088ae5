//! Implementation of the `pgit commit` and `pgit add-changes` commands.

use super::{Report, private_repository};
use crate::context::ProjectContext;
use crate::error::{PgitError, Result};
use crate::events::{self, Event, EventAction};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub commit: String,
    pub message: String,
    pub files: Vec<String>,
}

impl Report for CommitOutcome {
    fn message(&self) -> String {
        let subject = self.message.lines().next().unwrap_or_default();
        format!(
            "[private {}] {}\n  {} file(s) committed",
            self.commit.get(..7).unwrap_or(&self.commit),
            subject,
            self.files.len()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChangesOutcome {
    pub all: bool,
    /// Paths staged in private storage afterwards.
    pub staged: Vec<String>,
}

impl Report for AddChangesOutcome {
    fn message(&self) -> String {
        if self.staged.is_empty() {
            return "No changes to stage in private storage.".to_string();
        }
        let mut lines = vec![format!(
            "Staged {} change(s) in private storage:",
            self.staged.len()
        )];
        lines.extend(self.staged.iter().map(|p| format!("  {}", p)));
        lines.push("Commit them with `pgit commit`.".to_string());
        lines.join("\n")
    }
}

/// Commit what is staged in private storage.
pub fn commit(ctx: &ProjectContext, message: Option<&str>) -> Result<CommitOutcome> {
    let (private, _config) = private_repository(ctx)?;

    if !private.has_staged_changes()? {
        return Err(PgitError::InvalidInput(
            "nothing staged in private storage.\n\n\
             Stage changes to tracked files with `pgit add-changes`."
                .to_string(),
        ));
    }

    let files = private.status()?.staged;
    let message = match message {
        Some(message) => message.to_string(),
        None => default_message(&files),
    };

    let commit = private.commit(&message)?;
    debug!(commit = %commit, files = files.len(), "committed private changes");
    events::record(
        ctx,
        Event::new(EventAction::Commit).with_details(json!({
            "commit": commit,
            "files": files,
        })),
    );

    Ok(CommitOutcome {
        commit,
        message,
        files,
    })
}

/// Stage modified tracked files, or with `all` every change, in private storage.
pub fn add_changes(ctx: &ProjectContext, all: bool) -> Result<AddChangesOutcome> {
    let (private, _config) = private_repository(ctx)?;

    if all {
        private.add_all()?;
    } else {
        private.add_updated()?;
    }

    Ok(AddChangesOutcome {
        all,
        staged: private.status()?.staged,
    })
}

fn default_message(files: &[String]) -> String {
    match files {
        [single] => format!("Update {}", single),
        _ => format!("Update {} private files", files.len()),
    }
}
