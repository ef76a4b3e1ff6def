//! Tracing setup for tests.

/// Install a test-writer subscriber, once per process.
///
/// Safe to call from every test; repeat initialisations are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
