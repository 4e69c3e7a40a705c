//! Tracing/logging setup shared by processes embedding relaybus.

/// Initialize process-wide tracing (JSON logs).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing for unit/integration tests.
///
/// Output goes through the test harness capture. Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Subscriber construction (filters, formats).
pub mod tracing;
