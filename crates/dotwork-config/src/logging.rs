//! Logging bootstrap.
//!
//! Initializes the global `tracing` subscriber. The default level is `info`;
//! setting `DOT_WORK_DB_ISSUES_DEBUG` to a truthy value lifts it to `debug`,
//! and `RUST_LOG` (the standard `EnvFilter` variable) overrides both.

use tracing_subscriber::EnvFilter;

/// Debug-logging toggle for the issue store.
pub const DEBUG_ENV: &str = "DOT_WORK_DB_ISSUES_DEBUG";

/// Returns `true` if debug logging was requested via the environment.
pub fn debug_requested() -> bool {
    matches!(
        std::env::var(DEBUG_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Initializes the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let default_level = if debug_requested() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init so embedding applications that already installed a
    // subscriber keep theirs.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn debug_flag_parsing() {
        // The variable is unset in the default test environment.
        if std::env::var(DEBUG_ENV).is_err() {
            assert!(!debug_requested());
        }
    }
}
