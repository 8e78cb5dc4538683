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

//! Entities and Postgres-backed repositories for videos, tasks and upload accounts.

mod error;
mod model;
mod repository;

pub use error::{DomainError, DomainResult};
pub use model::{Account, AccountStatus, Task, TaskState, Video, VideoStatus};
pub use repository::{AccountRepository, TaskRepository, VideoRepository};

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Aggregate handle to every repository backed by a shared connection pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to Postgres and apply any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be established or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to the pipeline database")?;
        Self::new(pool).await
    }

    /// Wrap an already-constructed pool, applying any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail to apply.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run pipeline domain migrations")?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Repository for video rows.
    #[must_use]
    pub fn videos(&self) -> VideoRepository<'_> {
        VideoRepository::new(&self.pool)
    }

    /// Repository for task rows.
    #[must_use]
    pub fn tasks(&self) -> TaskRepository<'_> {
        TaskRepository::new(&self.pool)
    }

    /// Repository for account rows.
    #[must_use]
    pub fn accounts(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.pool)
    }
}
