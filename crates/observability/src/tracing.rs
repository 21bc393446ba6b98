//! Subscriber initialization.
//!
//! Filter directives come from `RUST_LOG` (default `info`). The service logs
//! JSON lines with timestamps; tests get compact text through the libtest
//! capture writer.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// JSON logs for the running service.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(DEFAULT_FILTER))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Compact logs routed through the test writer; `debug` for this workspace.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("weighbridge=debug,info"))
        .compact()
        .with_test_writer()
        .try_init();
}
