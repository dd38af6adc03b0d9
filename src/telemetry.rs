//! Logging bootstrap for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Directive used when `RUST_LOG` is unset: this crate at the configured
/// level, everything else at `warn`.
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("session_guard={},warn", config.level)
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.is_ok()
}
