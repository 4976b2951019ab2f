//! Mirror — keeps operator provider records in step with CAPIProvider records.
//!
//! # Usage
//!
//! ```text
//! mirror sync <namespace/name> [--dry-run]
//! mirror sync --all [--dry-run]
//! mirror status [--json]
//! mirror watch [--interval <secs>] [--passes <n>]
//! ```
//!
//! Every subcommand accepts `--root <dir>` (default `~/.mirror`) and
//! `--config <file>` (default `<root>/config.yaml` when present).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs, watch::WatchArgs, GlobalArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Mirror CAPIProvider records onto operator provider records",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile one or every source record once.
    Sync(SyncArgs),

    /// Show phase and condition summary of every source record.
    Status(StatusArgs),

    /// Reconcile every source record on a fixed interval until interrupted.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
        Commands::Watch(args) => args.run(&cli.global),
    }
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
