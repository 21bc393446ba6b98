//! Tracing/logging setup shared by the binary and the test suites.

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable output captured by the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Subscriber construction (filters, formatting).
pub mod tracing;
