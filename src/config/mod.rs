//! Configuration record for pgit.
//!
//! This module defines the record stored in `.private-config.json` at the
//! project root: the schema version, the layout paths, the list of tracked
//! paths, user settings and bookkeeping metadata. Keys are camelCase JSON.
//! Validation is explicit and returns every failing field at once.

mod migrations;
mod model;
mod store;
mod validation;


pub use migrations::{MIGRATIONS, Migration};
pub use model::{
    CURRENT_VERSION, CreateOptions, MAX_BACKUPS_RANGE, Metadata, PrivateConfig, Settings,
    SettingsOverrides,
};
pub use store::{ConfigHealth, ConfigStore, MigrationReport};
pub use validation::{ValidationIssue, normalize_tracked_path, validate_config};
