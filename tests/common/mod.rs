//! Shared test environment setup.

use tracing_subscriber::EnvFilter;

/// Install a tracing subscriber for test output.
///
/// Safe to call from every test: only the first call installs the
/// subscriber, later calls are no-ops. Transition and rejection logs show
/// up under `RUST_LOG=rule_router=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
