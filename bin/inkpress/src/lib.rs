//! Inkpress CLI Library
//!
//! Command implementations, the development rebuild loop and the dev
//! server, shared by the `inkpress` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, watch, new, check)
//! - [`watch`] - Debounced, serialized rebuild loop
//! - [`server`] - Embedded development server with live reload

pub mod cmd;
pub mod server;
pub mod watch;

pub use inkpress_core::Config;
pub use inkpress_generator::{BuildReport, Pipeline};

/// Initialize tracing with the specified verbosity level.
///
/// `0` logs at INFO, `1` at DEBUG and `2` or more at TRACE. A `RUST_LOG`
/// filter, when set, takes precedence.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
