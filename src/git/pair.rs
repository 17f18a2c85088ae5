//! The main and private repositories as one value.

use super::repository::GitRepository;
use crate::context::ProjectContext;
use std::path::{Component, Path, PathBuf};

/// Main working-tree repository plus the private storage repository, with the
/// path mapping between a tracked path's two locations.
#[derive(Debug, Clone)]
pub struct RepositoryPair {
    pub main: GitRepository,
    pub private: GitRepository,
    project_root: PathBuf,
    storage_root: PathBuf,
}

impl RepositoryPair {
    pub fn new(ctx: &ProjectContext) -> Self {
        Self {
            main: GitRepository::new(&ctx.project_root),
            private: GitRepository::new(&ctx.storage_dir),
            project_root: ctx.project_root.clone(),
            storage_root: ctx.storage_dir.clone(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Where the real content of `relative` lives.
    pub fn storage_path_for(&self, relative: &str) -> PathBuf {
        self.storage_root.join(relative)
    }

    /// Where the link for `relative` lives in the working tree.
    pub fn working_path_for(&self, relative: &str) -> PathBuf {
        self.project_root.join(relative)
    }

    /// Link text that leads from the working-tree location of `relative` to its
    /// storage location, e.g. `../.private-storage/config/.env` for `config/.env`.
    pub fn link_target_for(&self, relative: &str) -> PathBuf {
        let depth = Path::new(relative)
            .parent()
            .map(|p| {
                p.components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .count()
            })
            .unwrap_or(0);

        let mut target = PathBuf::new();
        for _ in 0..depth {
            target.push("..");
        }
        if let Ok(storage_rel) = self.storage_root.strip_prefix(&self.project_root) {
            target.push(storage_rel);
        }
        target.push(relative);
        target
    }
}
