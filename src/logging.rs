//! Logging setup for Invoicer
//!
//! Diagnostics go through `tracing` and are written to stderr so command output
//! on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise `level` (from settings) is used, falling
/// back to `info` if it does not parse. Calling this more than once is harmless.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init();
}
