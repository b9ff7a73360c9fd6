//! dvs CLI - track large data files next to git

use anyhow::Result;
use clap::{Parser, Subcommand};
use dvs_cli::cmd;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// dvs - Version large data files alongside git
#[derive(Parser)]
#[command(name = "dvs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize dvs in the current directory
    Init {
        /// Use dvs without git
        #[arg(long)]
        no_scm: bool,
    },
    /// Start tracking files or directories
    Add {
        /// Files or directories to track
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Track every file under the given directories separately
        #[arg(short = 'R', long)]
        recursive: bool,
        /// Write tracking files without storing data in the cache
        #[arg(long)]
        no_commit: bool,
        /// Name of the tracking file to write
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Save the current content of tracked outputs to the cache
    Commit {
        /// Tracking files or outputs (default: all)
        targets: Vec<PathBuf>,
    },
    /// Restore tracked outputs from the cache
    Checkout {
        /// Tracking files or outputs (default: all)
        targets: Vec<PathBuf>,
    },
    /// Replace links to the cache with editable copies
    Unprotect {
        /// Tracked files or directories
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },
    /// Show changed outputs
    Status,
    /// Show tracked outputs that changed between two git revisions
    Diff {
        /// Old revision (default: HEAD)
        a_rev: Option<String>,
        /// New revision (default: working tree)
        b_rev: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        show_json: bool,
        /// List individual files inside changed directories
        #[arg(long)]
        expand_dirs: bool,
    },
    /// Upload cache entries to the remote
    Push,
    /// Download cache entries from the remote
    Pull,
    /// Get or set a config option
    Config {
        /// Dotted key, e.g. cache.type
        key: String,
        /// New value
        value: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { no_scm } => cmd::init::run(no_scm),
        Commands::Add {
            targets,
            recursive,
            no_commit,
            file,
        } => cmd::add::run(&targets, recursive, no_commit, file),
        Commands::Commit { targets } => cmd::commit::run(&targets),
        Commands::Checkout { targets } => cmd::checkout::run(&targets),
        Commands::Unprotect { targets } => cmd::unprotect::run(&targets),
        Commands::Status => cmd::status::run(),
        Commands::Diff {
            a_rev,
            b_rev,
            show_json,
            expand_dirs,
        } => cmd::diff::run(a_rev, b_rev, show_json, expand_dirs),
        Commands::Push => cmd::push::run(),
        Commands::Pull => cmd::pull::run(),
        Commands::Config { key, value } => cmd::config::run(&key, value.as_deref()),
    }
}
