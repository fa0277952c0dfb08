//! Catalog storage and deployment tooling for the JWST Galley notification bot.
//!
//! - [`db`]: the `Resources` / `News` catalog over SQLite.
//! - [`settings`]: the generated `KEY = value` settings artifact.
//! - [`deploy`]: the package-and-deploy pipeline.

pub mod config;
pub mod db;
pub mod deploy;
pub mod model;
pub mod settings;

/// Install the global `tracing` subscriber. `RUST_LOG` takes precedence over
/// `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
