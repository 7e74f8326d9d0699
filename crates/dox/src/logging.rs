//! Diagnostic output setup

use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive, e.g. `DOX_LOG=dox_engine=trace`
pub const LOG_ENV: &str = "DOX_LOG";

/// Install the stderr subscriber.
///
/// Quiet by default so container output is not interleaved with ours.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
