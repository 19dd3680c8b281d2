//! Application log setup
//!
//! The trial audit log lives in the trial record; everything else
//! (action failures with stack traces, run start/finish, observer
//! notification) goes through `tracing`. Hosts that already install a
//! subscriber can skip this.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{Error, Result};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// # Errors
///
/// Returns [`Error::Other`] if a global subscriber is already set.
pub fn init_tracing() -> Result<()> {
    init_tracing_with(DEFAULT_FILTER)
}

/// Install a global `fmt` subscriber, falling back to `default_filter`
/// when `RUST_LOG` is unset or invalid.
///
/// # Errors
///
/// Returns [`Error::Other`] if a global subscriber is already set.
pub fn init_tracing_with(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to initialize tracing: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing();
        assert!(init_tracing_with("debug").is_err());
    }
}
