//! Logging setup and crate-wide logging macros.
//!
//! All diagnostics go through `tracing`. The `log_*!` macros keep call sites
//! short and make every message carry the `ridewave` target so one filter
//! directive covers the whole client.

pub use tracing;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ridewave=debug";

/// Install the global fmt subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::tracing::info!(target: "ridewave", $($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::tracing::error!(target: "ridewave", $($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::tracing::warn!(target: "ridewave", $($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::tracing::debug!(target: "ridewave", $($arg)*)
    };
}
