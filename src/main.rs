//! pgit: private file tracking next to a main git repository.
//!
//! This is the main entry point for the `pgit` CLI. It parses arguments,
//! sets up logging, dispatches to the appropriate command handler, and maps
//! the outcome to an exit code.

mod cli;
mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod git;
pub mod platform;
pub mod symlink;

#[cfg(test)]
mod test_support;

use cli::Cli;
use config::ConfigStore;
use context::ProjectContext;
use platform::Capabilities;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose || verbose_from_config());

    let result = commands::dispatch(cli.command, &Capabilities::detect());

    if result.success {
        println!("{}", result.message);
    } else if result.error_kind.is_some() {
        // Print user-actionable error message to stderr
        eprintln!("Error: {}", result.message);
    } else {
        eprintln!("{}", result.message);
    }

    ExitCode::from(result.exit_code as u8)
}

/// `RUST_LOG` wins; otherwise `debug` when verbose and `warn` when not.
fn init_logging(verbose: bool) {
    let default = if verbose { "pgit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// The `verboseOutput` setting of the enclosing project, if one is readable.
fn verbose_from_config() -> bool {
    ProjectContext::resolve()
        .ok()
        .filter(ProjectContext::is_initialized)
        .and_then(|ctx| ConfigStore::new(&ctx).load().ok())
        .is_some_and(|config| config.settings.verbose_output)
}
