//! Loading, saving and migrating the configuration record.

use super::migrations::{MIGRATIONS, needs_migration, raw_version};
use super::model::{CURRENT_VERSION, CreateOptions, Metadata, PrivateConfig, Settings};
use super::validation::{normalize_tracked_path, validate_config};
use crate::context::{DEFAULT_MARKER_DIR, DEFAULT_STORAGE_DIR, ProjectContext};
use crate::error::{PgitError, Result};
use crate::fs::{FsTransaction, PathPolicy, atomic_write_owner_only};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use serde_json::error::Category;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix of configuration backups written before a migration.
const CONFIG_BACKUP_PREFIX: &str = "private-config-";

/// Non-mutating diagnosis of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHealth {
    pub exists: bool,
    pub valid: bool,
    pub errors: Vec<String>,
    pub current_version: Option<String>,
    pub expected_version: String,
    pub needs_migration: bool,
}

/// Outcome of [`ConfigStore::migrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from: String,
    pub to: String,
    pub applied: Vec<String>,
    pub backup: Option<PathBuf>,
}

/// Owner of `.private-config.json`. Every mutation is a load-mutate-save
/// cycle through this type.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    backups_dir: PathBuf,
    cache: Option<PrivateConfig>,
}

impl ConfigStore {
    pub fn new(ctx: &ProjectContext) -> Self {
        Self::at(&ctx.config_path, ctx.backups_dir())
    }

    pub fn at<P: Into<PathBuf>, Q: Into<PathBuf>>(path: P, backups_dir: Q) -> Self {
        Self {
            path: path.into(),
            backups_dir: backups_dir.into(),
            cache: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Last successfully loaded or saved record.
    pub fn cached(&self) -> Option<&PrivateConfig> {
        self.cache.as_ref()
    }

    /// Read, parse and validate the record.
    pub fn load(&mut self) -> Result<PrivateConfig> {
        let raw = self.raw_bytes()?;
        let config = parse(&raw)?;

        let mut issues: Vec<String> = validate_config(&config)
            .iter()
            .map(ToString::to_string)
            .collect();
        if issues.is_empty() && config.version != CURRENT_VERSION {
            issues.push(format!(
                "version: '{}' does not match schema {}; migration required",
                config.version, CURRENT_VERSION
            ));
        }
        if !issues.is_empty() {
            return Err(PgitError::ConfigValidation(issues));
        }

        self.cache = Some(config.clone());
        Ok(config)
    }

    /// Validate, stamp `metadata.lastModified` and write the record.
    pub fn save(&mut self, mut config: PrivateConfig) -> Result<PrivateConfig> {
        let issues = validate_config(&config);
        if !issues.is_empty() {
            return Err(PgitError::ConfigValidation(
                issues.iter().map(ToString::to_string).collect(),
            ));
        }

        config.metadata.last_modified = Utc::now();
        let mut content = serde_json::to_string_pretty(&config).map_err(|e| {
            PgitError::ConfigValidation(vec![format!("failed to serialize configuration: {}", e)])
        })?;
        content.push('\n');

        let mut tx = FsTransaction::new().with_backups(false);
        if let Some(dir) = self.path.parent() {
            tx = tx.with_policy(PathPolicy::within(dir));
        }
        tx.write_atomic(&self.path, content.as_bytes())?;
        tx.clear_rollback_actions();

        debug!(path = %self.path.display(), tracked = config.tracked_paths.len(), "saved configuration");
        self.cache = Some(config.clone());
        Ok(config)
    }

    /// Write a fresh record for the project at `project_root`.
    pub fn create(&mut self, project_root: &Path, options: CreateOptions) -> Result<PrivateConfig> {
        if self.path.exists() {
            return Err(PgitError::AlreadyInitialized(self.path.clone()));
        }

        let mut settings = Settings::default();
        options.settings.apply(&mut settings);

        let project_name = options.project_name.unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        });

        let now = Utc::now();
        let config = PrivateConfig {
            version: CURRENT_VERSION.to_string(),
            private_repo_path: DEFAULT_MARKER_DIR.to_string(),
            storage_path: DEFAULT_STORAGE_DIR.to_string(),
            tracked_paths: Vec::new(),
            initialized: now,
            last_cleanup: None,
            settings,
            metadata: Metadata {
                project_name,
                main_repo_path: project_root.display().to_string(),
                cli_version: env!("CARGO_PKG_VERSION").to_string(),
                platform: std::env::consts::OS.to_string(),
                last_modified: now,
            },
        };

        self.save(config)
    }

    pub fn add_tracked_path(&mut self, path: &str) -> Result<PrivateConfig> {
        self.add_tracked_paths(&[path])
    }

    /// Append paths to `trackedPaths`. Nothing is written if any path is
    /// already present.
    pub fn add_tracked_paths<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<PrivateConfig> {
        let mut config = self.load()?;

        for path in paths {
            let normalized = normalize_tracked_path(path.as_ref());
            if config.is_tracked(&normalized) {
                return Err(PgitError::AlreadyTracked(normalized));
            }
            config.tracked_paths.push(normalized);
        }

        self.save(config)
    }

    pub fn remove_tracked_path(&mut self, path: &str) -> Result<PrivateConfig> {
        let mut config = self.load()?;
        let normalized = normalize_tracked_path(path);

        let Some(index) = config.tracked_paths.iter().position(|p| *p == normalized) else {
            return Err(PgitError::NotTracked(normalized));
        };
        config.tracked_paths.remove(index);

        self.save(config)
    }

    pub fn is_tracked(&mut self, path: &str) -> Result<bool> {
        let config = self.load()?;
        Ok(config.is_tracked(&normalize_tracked_path(path)))
    }

    /// Stamp `lastCleanup` with the current time.
    pub fn record_cleanup(&mut self) -> Result<PrivateConfig> {
        let mut config = self.load()?;
        config.last_cleanup = Some(Utc::now());
        self.save(config)
    }

    /// Exact bytes of the file on disk.
    pub fn raw_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PgitError::NotInitialized(format!(
                    "configuration not found at '{}'.\n\nRun `pgit init` to initialize private tracking.",
                    self.path.display()
                ))
            } else {
                PgitError::from_io(
                    e,
                    format!("failed to read configuration '{}'", self.path.display()),
                )
            }
        })
    }

    /// Put back bytes captured by [`raw_bytes`](Self::raw_bytes).
    pub fn restore_raw(&mut self, bytes: &[u8]) -> Result<()> {
        atomic_write_owner_only(&self.path, bytes)?;
        self.cache = None;
        Ok(())
    }

    /// Diagnose the file without changing anything.
    pub fn get_health(&self) -> ConfigHealth {
        let mut health = ConfigHealth {
            exists: self.exists(),
            valid: false,
            errors: Vec::new(),
            current_version: None,
            expected_version: CURRENT_VERSION.to_string(),
            needs_migration: false,
        };

        if !health.exists {
            health.errors.push("configuration file does not exist".to_string());
            return health;
        }

        let raw = match self.raw_bytes() {
            Ok(raw) => raw,
            Err(e) => {
                health.errors.push(e.to_string());
                return health;
            }
        };

        if let Ok(value) = serde_json::from_slice::<Value>(&raw) {
            health.current_version = value
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_string);
            health.needs_migration = raw_version(&value).is_some_and(|v| needs_migration(&v));
        }

        match parse(&raw) {
            Ok(config) => health
                .errors
                .extend(validate_config(&config).iter().map(ToString::to_string)),
            Err(e) => health.errors.push(e.to_string()),
        }

        health.valid = health.errors.is_empty() && !health.needs_migration;
        health
    }

    /// Upgrade an older record to the current schema.
    ///
    /// The raw file is backed up first and put back if any step fails.
    pub fn migrate(&mut self) -> Result<MigrationReport> {
        let raw = self.raw_bytes()?;
        let mut value: Value = serde_json::from_slice(&raw)
            .map_err(|e| PgitError::ConfigCorrupted(e.to_string()))?;

        let from = raw_version(&value).ok_or_else(|| {
            PgitError::MigrationFailed("configuration has no valid version field".to_string())
        })?;
        let current = semver::Version::parse(CURRENT_VERSION)
            .map_err(|e| PgitError::MigrationFailed(e.to_string()))?;

        if from > current {
            return Err(PgitError::MigrationFailed(format!(
                "configuration version {} is newer than supported version {}",
                from, current
            )));
        }

        let mut report = MigrationReport {
            from: from.to_string(),
            to: CURRENT_VERSION.to_string(),
            applied: Vec::new(),
            backup: None,
        };
        if from == current {
            return Ok(report);
        }

        let backup = self.write_backup(&raw)?;
        report.backup = Some(backup);

        for migration in MIGRATIONS.iter().filter(|m| m.applies_to(&from)) {
            if let Err(reason) = (migration.apply)(&mut value) {
                self.restore_after_failed_migration(&raw);
                return Err(PgitError::MigrationFailed(format!(
                    "{} -> {} ({}): {}",
                    migration.from, migration.to, migration.description, reason
                )));
            }
            if migration.destructive {
                warn!(description = migration.description, "applied destructive migration");
            }
            report.applied.push(migration.description.to_string());
        }

        let migrated = serde_json::from_value::<PrivateConfig>(value)
            .map_err(|e| e.to_string())
            .and_then(|config| {
                let issues = validate_config(&config);
                if issues.is_empty() {
                    Ok(config)
                } else {
                    Err(issues
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "))
                }
            });

        let config = match migrated {
            Ok(config) if config.version == CURRENT_VERSION => config,
            Ok(config) => {
                self.restore_after_failed_migration(&raw);
                return Err(PgitError::MigrationFailed(format!(
                    "no migration path from {} to {}",
                    config.version, CURRENT_VERSION
                )));
            }
            Err(reason) => {
                self.restore_after_failed_migration(&raw);
                return Err(PgitError::MigrationFailed(reason));
            }
        };

        let max_backups = config.settings.max_backups;
        if let Err(e) = self.save(config) {
            self.restore_after_failed_migration(&raw);
            return Err(PgitError::MigrationFailed(e.to_string()));
        }

        self.prune_backups(max_backups as usize);
        info!(from = %report.from, to = %report.to, "migrated configuration");
        Ok(report)
    }

    fn restore_after_failed_migration(&mut self, raw: &[u8]) {
        if let Err(e) = self.restore_raw(raw) {
            warn!(error = %e, "failed to restore configuration after migration failure");
        }
    }

    fn write_backup(&self, raw: &[u8]) -> Result<PathBuf> {
        let path = self.backups_dir.join(format!(
            "{}{}.json",
            CONFIG_BACKUP_PREFIX,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        atomic_write_owner_only(&path, raw)?;
        Ok(path)
    }

    /// Configuration backups on disk, oldest first.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.backups_dir) else {
            return Vec::new();
        };

        let mut backups: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(CONFIG_BACKUP_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        backups.sort();
        backups
    }

    fn prune_backups(&self, keep: usize) {
        let backups = self.backups();
        let excess = backups.len().saturating_sub(keep);
        for old in &backups[..excess] {
            if let Err(e) = fs::remove_file(old) {
                warn!(backup = %old.display(), error = %e, "failed to prune configuration backup");
            }
        }
    }
}

fn parse(raw: &[u8]) -> Result<PrivateConfig> {
    serde_json::from_slice(raw).map_err(|e| match e.classify() {
        Category::Syntax | Category::Eof => PgitError::ConfigCorrupted(e.to_string()),
        Category::Data => PgitError::ConfigValidation(vec![e.to_string()]),
        Category::Io => PgitError::Filesystem(format!("failed to read configuration: {}", e)),
    })
}
