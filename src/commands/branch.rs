//! Implementation of the `pgit branch` and `pgit checkout` commands.
//!
//! Both operate on the private repository only. Switching branches there can
//! leave tracked links in the main working tree pointing at files the new
//! branch does not have; checkout reports those links.

use super::{Report, private_repository};
use crate::context::ProjectContext;
use crate::error::Result;
use crate::events::{self, Event, EventAction};
use crate::git::RepositoryPair;
use crate::platform::Capabilities;
use crate::symlink::SymlinkManager;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchReport {
    pub current: Option<String>,
    pub branches: Vec<String>,
    /// Branch created by this invocation.
    pub created: Option<String>,
}

impl Report for BranchReport {
    fn message(&self) -> String {
        if let Some(created) = &self.created {
            return format!("Created private branch '{}'", created);
        }
        self.branches
            .iter()
            .map(|b| {
                let marker = if self.current.as_deref() == Some(b.as_str()) {
                    '*'
                } else {
                    ' '
                };
                format!("{} {}", marker, b)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub target: String,
    /// Branch now checked out, `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Tracked paths whose content is absent after the switch.
    pub dangling: Vec<String>,
}

impl Report for CheckoutOutcome {
    fn message(&self) -> String {
        let mut message = format!("Switched private storage to '{}'", self.target);
        if !self.dangling.is_empty() {
            message.push_str(&format!(
                "\n\nWarning: {} tracked link(s) have no content on this revision:",
                self.dangling.len()
            ));
            for path in &self.dangling {
                message.push_str(&format!("\n  {}", path));
            }
        }
        message
    }
}

/// List private branches, or create `name` at HEAD.
pub fn branch(ctx: &ProjectContext, name: Option<&str>) -> Result<BranchReport> {
    let (private, _config) = private_repository(ctx)?;

    let created = match name {
        Some(name) => {
            private.create_branch(name)?;
            events::record(
                ctx,
                Event::new(EventAction::Branch).with_details(json!({ "created": name })),
            );
            Some(name.to_string())
        }
        None => None,
    };

    Ok(BranchReport {
        current: private.current_branch()?,
        branches: private.branches()?,
        created,
    })
}

/// Check out `target` in private storage and report links left dangling.
pub fn checkout(ctx: &ProjectContext, capabilities: &Capabilities, target: &str) -> Result<CheckoutOutcome> {
    let (private, config) = private_repository(ctx)?;

    private.checkout(target)?;

    let pair = RepositoryPair::new(ctx);
    let symlinks = SymlinkManager::new(capabilities);
    let dangling: Vec<String> = config
        .tracked_paths
        .iter()
        .filter(|rel| !symlinks.validate(&pair.working_path_for(rel)).is_healthy())
        .cloned()
        .collect();

    let branch = private.current_branch()?;
    events::record(
        ctx,
        Event::new(EventAction::Checkout).with_details(json!({
            "target": target,
            "branch": branch,
            "dangling": dangling,
        })),
    );

    Ok(CheckoutOutcome {
        target: target.to_string(),
        branch,
        dangling,
    })
}
