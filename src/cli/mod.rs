//! CLI argument parsing for pgit.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};

/// pgit: track private files in a hidden repository next to your main one.
///
/// Tracked files are moved into `.private-storage/` (a git repository of its
/// own) and replaced with symbolic links, so the main repository never sees
/// their content.
#[derive(Parser, Debug)]
#[command(name = "pgit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for pgit.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize private tracking in the current repository.
    ///
    /// Creates the private storage repository, the configuration file and
    /// the required `.gitignore` entries.
    Init,

    /// Show main repository status and the health of tracked links.
    Status,

    /// Show the status of the private storage repository.
    PrivateStatus,

    /// Track paths privately.
    ///
    /// Moves each path into private storage, leaves a symbolic link in its
    /// place and commits it to the private repository. Either every path is
    /// tracked or nothing changes.
    Add(AddArgs),

    /// Commit staged changes in the private repository.
    Commit(CommitArgs),

    /// Show private repository history.
    Log(LogArgs),

    /// Stage changes to tracked files in the private repository.
    AddChanges(AddChangesArgs),

    /// Show changes in the private repository.
    Diff(DiffArgs),

    /// List private branches, or create one.
    Branch(BranchArgs),

    /// Switch the private repository to a branch or commit.
    Checkout(CheckoutArgs),

    /// Detect and repair inconsistencies between the two repositories.
    Cleanup(CleanupArgs),
}

/// Arguments for the `add` command.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Paths relative to the project root.
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,
}

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Commit message (generated when omitted).
    #[arg(short, long)]
    pub message: Option<String>,
}

/// Arguments for the `log` command.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Number of commits to show.
    #[arg(short = 'n', long = "max-count", default_value_t = 10)]
    pub max_count: usize,
}

/// Arguments for the `add-changes` command.
#[derive(Args, Debug)]
pub struct AddChangesArgs {
    /// Stage everything in private storage, including new files.
    #[arg(short, long)]
    pub all: bool,
}

/// Arguments for the `diff` command.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Show staged changes.
    #[arg(long)]
    pub cached: bool,

    /// Only list changed file names.
    #[arg(long)]
    pub name_only: bool,
}

/// Arguments for the `branch` command.
#[derive(Args, Debug)]
pub struct BranchArgs {
    /// Name of a branch to create.
    pub name: Option<String>,
}

/// Arguments for the `checkout` command.
#[derive(Args, Debug)]
pub struct CheckoutArgs {
    /// Branch or commit to check out.
    pub target: String,
}

/// Arguments for the `cleanup` command.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Also remove tracked paths that leaked back into the main index.
    #[arg(short, long)]
    pub force: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
