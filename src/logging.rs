//! Diagnostic logging to stderr.
//!
//! Stdout is reserved for command output, so every event goes to stderr.
//! `UTILITY_METER_LOG` takes an `EnvFilter` directive and wins over `-v`.

use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "UTILITY_METER_LOG";

pub const fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(filter_for_verbosity(verbosity)))
}

/// Installs the global subscriber. Calling it twice is harmless; the
/// second call is ignored.
pub fn init_tracing(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
