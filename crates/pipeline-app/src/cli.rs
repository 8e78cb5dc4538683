//! Command-line surface for the pipeline binary.

use clap::{Parser, Subcommand};

/// Ingestion pipeline process: resolver HTTP server plus background
/// orchestrator, ingester and stage workers.
#[derive(Debug, Parser)]
#[command(name = "pipeline-app", version, about)]
pub(crate) struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the resolver HTTP server and every background worker until `ctrl_c`.
    Serve,
    /// Apply pending store migrations and exit.
    Migrate,
}
