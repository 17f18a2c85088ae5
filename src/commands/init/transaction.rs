//! Undo bookkeeping for a partially completed `pgit init`.

use crate::fs::remove_path;
use std::path::PathBuf;
use tracing::warn;

/// Everything init created, so a failure can remove it again.
#[derive(Debug, Default)]
pub(super) struct InitTransaction {
    /// Directories created by init, in creation order.
    pub created_dirs: Vec<PathBuf>,
    /// Configuration file written by init.
    pub config_written: Option<PathBuf>,
}

impl InitTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove what was created, newest first. Errors are logged and skipped.
    pub fn rollback(self) {
        if let Some(config) = self.config_written
            && let Err(e) = remove_path(&config)
        {
            warn!(path = %config.display(), error = %e, "failed to remove configuration");
        }

        for dir in self.created_dirs.iter().rev() {
            if let Err(e) = remove_path(dir) {
                warn!(path = %dir.display(), error = %e, "failed to remove directory");
            }
        }
    }
}
