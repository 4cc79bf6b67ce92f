//! Tracing initialization for the rondo daemon.

use tracing_subscriber::EnvFilter;

/// Install the console subscriber.
///
/// Call once at startup, before any events are emitted. `RUST_LOG`
/// overrides the configured level when set.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
