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
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! Shared test helpers used across integration suites.
//!
//! Layout: `postgres` (disposable-database spin-up, `skip_without_postgres!`),
//! `redis` (real-broker connectivity, `skip_without_redis!`), `fixtures`
//! (docker availability probing), `docker` (thin re-export of
//! `fixtures::docker_available` kept for call sites that read better as
//! `docker::available()`).

pub mod fixtures;
pub mod postgres;
pub mod redis;

/// Docker-related helpers for integration tests that rely on a container runtime.
pub mod docker {
    /// Returns `true` if a Docker daemon is reachable for integration tests.
    #[must_use]
    pub fn available() -> bool {
        crate::fixtures::docker_available()
    }
}
