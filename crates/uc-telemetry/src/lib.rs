//! # Telemetry
//!
//! Process-wide logging setup. One `tracing-subscriber` `fmt` layer, driven by
//! an `EnvFilter` read from `USVL_LOG` (falling back to `RUST_LOG`), installed
//! once at process start by the `node-runtime` binary.
//!
//! Components don't configure logging themselves -- they just call the
//! `tracing` macros (`tracing::info!`, `tracing::warn_span!`, ...) and rely on
//! the spans they open (`chain_id`, `event_id`, `session_id`) to disambiguate
//! log lines from concurrent workers.

use tracing_subscriber::EnvFilter;

/// Default filter directive when neither `USVL_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global `tracing` subscriber. Call exactly once, as early as
/// possible in `main`. Idempotent calls (e.g. from tests) are tolerated: a
/// failed `try_init` is swallowed rather than panicking, since a subscriber
/// may already be installed by the test harness.
pub fn init() {
    let filter = EnvFilter::try_from_env("USVL_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}

/// Installs a subscriber suitable for `#[tokio::test]`/`#[test]` bodies: always
/// `DEFAULT_FILTER` unless overridden, writes to the test harness's captured
/// stdout. Safe to call from many tests concurrently.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_env("USVL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
