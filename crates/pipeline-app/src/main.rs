#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Entry point: parses the CLI, then either serves the pipeline or applies
//! pending migrations and exits.

mod bootstrap;
mod cli;
mod error;
mod local;
mod workers;

use clap::Parser;
use cli::{Cli, Command};
use error::AppError;
use pipeline_domain::Store;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => bootstrap::run_app().await?,
        Command::Migrate => {
            let settings = pipeline_config::Settings::from_env().map_err(|source| AppError::Config {
                operation: "settings.from_env",
                source,
            })?;
            Store::connect(&settings.database_url)
                .await
                .map_err(|source| AppError::Store {
                    operation: "store.connect",
                    source,
                })?;
            tracing::info!("migrations applied");
        }
    }

    Ok(())
}
