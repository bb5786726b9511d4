//! Subscriber setup for programs and tests embedding the engine
//!
//! The library only emits `tracing` events: stage summaries at `info`,
//! per-record drops at `debug`, residual exceptions at `warn`. Nothing is
//! printed until one of these helpers (or the host's own subscriber) is
//! installed.

use tracing_subscriber::{fmt, EnvFilter};

/// Directives used when `RUST_LOG` is unset: run summaries from this crate,
/// warnings from everything else
pub const DEFAULT_DIRECTIVES: &str = "warn,feed_recon=info";

/// Directives for tests when `RUST_LOG` is unset
pub const TEST_DIRECTIVES: &str = "warn,feed_recon=debug";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber for a program.
///
/// Run spans carry the run id, so interleaved parallel runs stay readable.
///
/// ```no_run
/// feed_recon::logging::init();
/// ```
pub fn init() {
    fmt()
        .with_env_filter(filter_or(DEFAULT_DIRECTIVES))
        .with_target(false)
        .init();
}

/// Install a subscriber captured by the test harness. Repeated calls are
/// no-ops; `RUST_LOG` still overrides the level, e.g.
/// `RUST_LOG=feed_recon::normalize=trace cargo test`.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(filter_or(TEST_DIRECTIVES))
        .with_target(true)
        .with_test_writer()
        .try_init();
}
