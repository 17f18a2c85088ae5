//! Append-only audit log of mutating pgit commands.
//!
//! Events are stored as NDJSON (one JSON object per line) in
//! `.git-private/events.ndjson`. Each record carries:
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (init, add, commit, rollback, ...)
//! - `actor`: `user@HOST`
//! - `path`: the tracked path concerned, when there is exactly one
//! - `details`: action-specific object
//!
//! ```no_run
//! use pgit::context::ProjectContext;
//! use pgit::events::{Event, EventAction, append_event};
//! use serde_json::json;
//!
//! let ctx = ProjectContext::resolve()?;
//! let event = Event::new(EventAction::Add)
//!     .with_path("config/.env")
//!     .with_details(json!({ "commit": "abc123" }));
//! append_event(&ctx, &event)?;
//! # Ok::<(), pgit::error::PgitError>(())
//! ```

use crate::context::ProjectContext;
use crate::error::{PgitError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Init,
    /// Paths relocated into private storage.
    Add,
    /// Commit in the private repository.
    Commit,
    Branch,
    Checkout,
    Cleanup,
    /// A failed operation was unwound.
    Rollback,
    /// Configuration upgraded to the current schema.
    Migrate,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventAction::Init => "init",
            EventAction::Add => "add",
            EventAction::Commit => "commit",
            EventAction::Branch => "branch",
            EventAction::Checkout => "checkout",
            EventAction::Cleanup => "cleanup",
            EventAction::Rollback => "rollback",
            EventAction::Migrate => "migrate",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub action: EventAction,
    /// `user@HOST` of whoever ran the command.
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub details: Value,
}

impl Event {
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor_string(),
            path: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Single-line JSON for the log.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| PgitError::Filesystem(format!("failed to serialize event: {}", e)))
    }
}

fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append one event line to the project's log, creating the file on demand.
pub fn append_event(ctx: &ProjectContext, event: &Event) -> Result<()> {
    let events_file = ctx.events_file();
    let json_line = event.to_ndjson_line()?;

    if let Some(dir) = events_file.parent()
        && !dir.exists()
    {
        fs::create_dir_all(dir).map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to create event log directory '{}'", dir.display()),
            )
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to open event log '{}'", events_file.display()),
            )
        })?;

    writeln!(file, "{}", json_line)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to write event log '{}'", events_file.display()),
            )
        })
}

/// Append an event, logging instead of failing. For commands whose primary
/// effect has already been committed.
pub fn record(ctx: &ProjectContext, event: Event) {
    if let Err(e) = append_event(ctx, &event) {
        tracing::warn!(action = %event.action, error = %e, "failed to append event");
    }
}

/// Every event in the log, oldest first. Unparsable lines are skipped.
pub fn read_events(ctx: &ProjectContext) -> Result<Vec<Event>> {
    let events_file = ctx.events_file();
    if !events_file.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&events_file).map_err(|e| {
        PgitError::from_io(
            e,
            format!("failed to read event log '{}'", events_file.display()),
        )
    })?;

    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
