//! Configuration record definition and defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_VERSION: &str = "1.0.0";

/// Allowed range for `settings.maxBackups`.
pub const MAX_BACKUPS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Contents of `.private-config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateConfig {
    pub version: String,

    /// Marker directory, relative to the project root.
    pub private_repo_path: String,

    /// Private storage repository, relative to the project root.
    pub storage_path: String,

    /// Root-relative, `/`-separated paths relocated into storage.
    #[serde(default)]
    pub tracked_paths: Vec<String>,

    pub initialized: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup: Option<DateTime<Utc>>,

    #[serde(default)]
    pub settings: Settings,

    pub metadata: Metadata,
}

/// User-tunable behavior. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Keep tracked paths listed in the main repository's exclude file.
    pub auto_gitignore: bool,

    /// Report unhealthy links from `status`.
    pub auto_cleanup: bool,

    /// Debug-level logging without `--verbose`.
    pub verbose_output: bool,

    /// Copy files aside before moving them.
    pub create_backups: bool,

    /// Configuration backups kept after a migration.
    pub max_backups: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_gitignore: true,
            auto_cleanup: false,
            verbose_output: false,
            create_backups: true,
            max_backups: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub project_name: String,
    pub main_repo_path: String,
    pub cli_version: String,
    pub platform: String,
    pub last_modified: DateTime<Utc>,
}

/// Per-field overrides applied on top of [`Settings::default`] at creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsOverrides {
    pub auto_gitignore: Option<bool>,
    pub auto_cleanup: Option<bool>,
    pub verbose_output: Option<bool>,
    pub create_backups: Option<bool>,
    pub max_backups: Option<u32>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.auto_gitignore {
            settings.auto_gitignore = v;
        }
        if let Some(v) = self.auto_cleanup {
            settings.auto_cleanup = v;
        }
        if let Some(v) = self.verbose_output {
            settings.verbose_output = v;
        }
        if let Some(v) = self.create_backups {
            settings.create_backups = v;
        }
        if let Some(v) = self.max_backups {
            settings.max_backups = v;
        }
    }
}

/// Options for [`ConfigStore::create`](super::ConfigStore::create).
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Defaults to the project directory name.
    pub project_name: Option<String>,
    pub settings: SettingsOverrides,
}

impl PrivateConfig {
    /// Whether `path` (already normalized) is in `trackedPaths`.
    pub fn is_tracked(&self, path: &str) -> bool {
        self.tracked_paths.iter().any(|p| p == path)
    }
}
