//! Implementation of the `pgit log` and `pgit diff` commands.

use super::{Report, private_repository};
use crate::context::ProjectContext;
use crate::error::Result;
use crate::git::{DiffOptions, LogEntry};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReport {
    pub entries: Vec<LogEntry>,
}

impl Report for LogReport {
    fn message(&self) -> String {
        if self.entries.is_empty() {
            return "No private commits yet.".to_string();
        }
        self.entries
            .iter()
            .map(|e| format!("{} {} ({}, {})", e.short_hash, e.message, e.author, e.date))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub cached: bool,
    pub name_only: bool,
    pub diff: String,
}

impl Report for DiffReport {
    fn message(&self) -> String {
        if self.diff.is_empty() {
            let what = if self.cached { "staged" } else { "unstaged" };
            return format!("No {} changes in private storage.", what);
        }
        self.diff.clone()
    }
}

/// Most recent private commits, newest first.
pub fn log(ctx: &ProjectContext, limit: usize) -> Result<LogReport> {
    let (private, _config) = private_repository(ctx)?;
    Ok(LogReport {
        entries: private.log(limit)?,
    })
}

pub fn diff(ctx: &ProjectContext, options: DiffOptions) -> Result<DiffReport> {
    let (private, _config) = private_repository(ctx)?;
    Ok(DiffReport {
        cached: options.cached,
        name_only: options.name_only,
        diff: private.diff(options)?,
    })
}
