//! Tracing initialization, shared by the HTTP server and the CLI front end.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber once at process start.
///
/// `level` is an `EnvFilter` directive string (e.g.
/// `"info,sql_optimizer=debug"`), taken from `Config::logging.level` the same
/// way `main.rs` wires `tracing_subscriber`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_level(true);

    if tracing_subscriber::registry().with(filter).with(fmt_layer).try_init().is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
