//! Log subscriber setup for binaries and demos embedding the bridge.
//!
//! The library itself only emits `tracing` events; installing a subscriber is the
//! host's call. These helpers are for hosts that have none of their own.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "AI_BRIDGE_LOG";

fn filter_from_env(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a fmt subscriber filtered by `AI_BRIDGE_LOG` / `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    init_with_filter("info")
}

pub fn init_with_filter(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from_env(default_directive))
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_is_harmless() {
        let _ = super::init_with_filter("debug");
        assert!(!super::init());
    }
}
