//! Command implementations for pgit.
//!
//! Every command returns a typed outcome implementing [`Report`]; the
//! dispatcher turns it (or the error that stopped it) into a
//! [`CommandResult`] that `main` prints.

pub mod add;
mod branch;
pub mod cleanup;
mod commit;
mod history;
mod ignore;
pub mod init;
mod status;

use crate::cli::Command;
use crate::config::{ConfigStore, PrivateConfig};
use crate::context::ProjectContext;
use crate::error::{ErrorKind, PgitError, Result};
use crate::events::{self, Event, EventAction};
use crate::exit_codes;
use crate::git::{DiffOptions, GitRepository};
use crate::platform::Capabilities;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

/// A command outcome that can be shown to the user.
pub trait Report: Serialize {
    /// Human-readable summary.
    fn message(&self) -> String;

    /// Whether the command achieved what it was asked to.
    fn success(&self) -> bool {
        true
    }
}

/// Uniform result of every command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recoverable: Option<bool>,
}

impl CommandResult {
    pub fn from_report<R: Report>(report: &R) -> Self {
        let success = report.success();
        Self {
            success,
            message: report.message(),
            data: serde_json::to_value(report).ok(),
            exit_code: if success {
                exit_codes::SUCCESS
            } else {
                exit_codes::FAILURE
            },
            error_kind: None,
            recoverable: None,
        }
    }

    pub fn from_error(err: &PgitError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            data: None,
            exit_code: err.exit_code(),
            error_kind: Some(err.kind()),
            recoverable: Some(err.is_recoverable()),
        }
    }
}

/// Run a parsed command from the current working directory.
pub fn dispatch(command: Command, capabilities: &Capabilities) -> CommandResult {
    match ProjectContext::resolve().and_then(|ctx| execute(&ctx, command, capabilities)) {
        Ok(result) => result,
        Err(err) => CommandResult::from_error(&err),
    }
}

/// Run a parsed command against a resolved project.
pub fn execute(ctx: &ProjectContext, command: Command, capabilities: &Capabilities) -> Result<CommandResult> {
    let result = match command {
        Command::Init => respond(&init::run(ctx, capabilities, &init::InitOptions::default())?),
        Command::Status => respond(&status::status(ctx, capabilities)?),
        Command::PrivateStatus => respond(&status::private_status(ctx)?),
        Command::Add(args) => respond(&add::run(
            ctx,
            capabilities,
            args.paths.as_slice(),
            &add::AddOptions::default(),
        )?),
        Command::Commit(args) => respond(&commit::commit(ctx, args.message.as_deref())?),
        Command::Log(args) => respond(&history::log(ctx, args.max_count)?),
        Command::AddChanges(args) => respond(&commit::add_changes(ctx, args.all)?),
        Command::Diff(args) => respond(&history::diff(
            ctx,
            DiffOptions {
                cached: args.cached,
                name_only: args.name_only,
            },
        )?),
        Command::Branch(args) => respond(&branch::branch(ctx, args.name.as_deref())?),
        Command::Checkout(args) => respond(&branch::checkout(ctx, capabilities, &args.target)?),
        Command::Cleanup(args) => respond(&cleanup::run(
            ctx,
            capabilities,
            &cleanup::CleanupOptions { force: args.force },
        )?),
    };
    Ok(result)
}

fn respond<R: Report>(report: &R) -> CommandResult {
    CommandResult::from_report(report)
}

/// Load the configuration of an initialized project, migrating an older
/// schema first.
pub(crate) fn open_config(ctx: &ProjectContext) -> Result<(ConfigStore, PrivateConfig)> {
    ctx.ensure_initialized()?;

    let mut store = ConfigStore::new(ctx);
    if store.get_health().needs_migration {
        let report = store.migrate()?;
        info!(from = %report.from, to = %report.to, "configuration migrated");
        events::record(
            ctx,
            Event::new(EventAction::Migrate).with_details(json!({
                "from": report.from,
                "to": report.to,
                "applied": report.applied,
                "backup": report.backup.map(|p| p.display().to_string()),
            })),
        );
    }

    let config = store.load()?;
    Ok((store, config))
}

/// Private repository handle, plus the loaded configuration, for commands
/// that only work inside storage.
pub(crate) fn private_repository(ctx: &ProjectContext) -> Result<(GitRepository, PrivateConfig)> {
    let (_store, config) = open_config(ctx)?;
    let private = GitRepository::new(&ctx.storage_dir);
    if !ctx.storage_dir.is_dir() {
        return Err(PgitError::Environment(format!(
            "private storage '{}' is missing.\n\nRun `pgit cleanup` or re-initialize.",
            ctx.storage_dir.display()
        )));
    }
    private.ensure_repository()?;
    Ok((private, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DirGuard, create_initialized_project, create_test_repo, write_file};
    use serial_test::serial;

    #[test]
    fn test_error_result_carries_kind_and_recoverability() {
        let result = CommandResult::from_error(&PgitError::AlreadyTracked("a.txt".into()));

        assert!(!result.success);
        assert_eq!(result.exit_code, exit_codes::FAILURE);
        assert_eq!(result.error_kind, Some(ErrorKind::AlreadyTracked));
        assert_eq!(result.recoverable, Some(false));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errorKind"], "already_tracked");
        assert_eq!(json["exitCode"], 1);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_execute_routes_add_and_status() {
        let (_temp_dir, ctx) = create_initialized_project();
        write_file(&ctx.project_root, "a.txt", "a");
        let caps = Capabilities::detect();

        let result = execute(
            &ctx,
            Command::Add(crate::cli::AddArgs {
                paths: vec!["a.txt".to_string()],
            }),
            &caps,
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, exit_codes::SUCCESS);
        assert_eq!(result.data.as_ref().unwrap()["paths"][0], "a.txt");

        let result = execute(&ctx, Command::Status, &caps).unwrap();
        assert!(result.success);
        assert!(result.message.contains("a.txt"));
    }

    #[test]
    fn test_open_config_requires_init() {
        let temp_dir = create_test_repo();
        let ctx = ProjectContext::resolve_from(temp_dir.path()).unwrap();

        let err = open_config(&ctx).unwrap_err();

        assert!(matches!(err, PgitError::NotInitialized(_)));
    }

    #[test]
    fn test_open_config_migrates_legacy_record() {
        let (_temp_dir, ctx) = create_initialized_project();
        let mut value: Value =
            serde_json::from_slice(&std::fs::read(&ctx.config_path).unwrap()).unwrap();
        value["version"] = json!("0.9.0");
        std::fs::write(&ctx.config_path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();

        let (store, config) = open_config(&ctx).unwrap();

        assert_eq!(config.version, crate::config::CURRENT_VERSION);
        assert_eq!(store.backups().len(), 1);
        let events = events::read_events(&ctx).unwrap();
        assert_eq!(events.last().unwrap().action, EventAction::Migrate);
    }

    #[test]
    fn test_private_repository_requires_storage() {
        let (_temp_dir, ctx) = create_initialized_project();
        std::fs::remove_dir_all(&ctx.storage_dir).unwrap();

        let err = private_repository(&ctx).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.to_string().contains(".private-storage"));
    }

    #[test]
    #[serial]
    fn test_dispatch_resolves_project_from_current_dir() {
        let temp_dir = create_test_repo();
        let nested = temp_dir.path().join("src/nested");
        std::fs::create_dir_all(&nested).unwrap();
        let _guard = DirGuard::new(&nested);
        let caps = Capabilities::detect();

        let result = dispatch(Command::Status, &caps);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Environment));
        assert!(result.message.contains("pgit init"));

        let result = dispatch(Command::Init, &caps);
        assert!(result.success, "{}", result.message);
        assert!(temp_dir.path().join(".private-storage/.git").is_dir());
        assert!(!nested.join(".private-storage").exists());
    }

    #[test]
    #[serial]
    fn test_dispatch_outside_repository() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let _guard = DirGuard::new(temp_dir.path());

        let result = dispatch(Command::PrivateStatus, &Capabilities::detect());

        assert!(!result.success);
        assert_eq!(result.exit_code, exit_codes::FAILURE);
        assert_eq!(result.error_kind, Some(ErrorKind::Environment));
    }
}
