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

//! Stateless axum HTTP surface that turns a video's share URL into a
//! directly-playable CDN URL.
//!
//! [`bootstrap::build_server`] wires an [`router::ApiServer`] from
//! [`pipeline_config::Settings`] and already-constructed store/metrics
//! handles; [`router::ApiServer::serve`] then owns the listener.

mod bootstrap;
mod cache;
mod error;
mod handlers;
mod rate_limit;
mod resolver;
mod router;
mod state;

pub use bootstrap::build_server;
pub use router::ApiServer;
