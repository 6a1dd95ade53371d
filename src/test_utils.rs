//! Test utilities for Lockstep.
//!
//! Shared helpers for unit tests: consistent tracing-based logging
//! initialization and runtime constructors. Gated behind
//! `cfg(test)`/`test-internals` so they never ship in release builds.

use crate::runtime::Runtime;
use crate::types::LogicalTime;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        // The subscriber comes from dev-dependencies, so the hookup only
        // exists for the crate's own test builds; `test-internals` builds
        // still get the constructors below.
        #[cfg(test)]
        {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .with_target(true)
                .with_ansi(false)
                .try_init();
        }
    });
}

/// Create a runtime starting at time zero, with logging initialized.
#[must_use]
pub fn test_runtime() -> Runtime {
    init_test_logging();
    Runtime::new()
}

/// Create a runtime starting at a given tick, with logging initialized.
#[must_use]
pub fn test_runtime_at(ticks: u64) -> Runtime {
    init_test_logging();
    Runtime::starting_at(LogicalTime::from_ticks(ticks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_clean_runtimes() {
        let rt = test_runtime();
        assert_eq!(rt.now(), LogicalTime::ZERO);
        let rt = test_runtime_at(9);
        assert_eq!(rt.now(), LogicalTime::from_ticks(9));
    }
}
