//! Tracing/logging setup shared by binaries and tests.

/// Initialize process-wide tracing.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Install a subscriber that writes through the test harness capture.
///
/// Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, formats).
pub mod tracing;
