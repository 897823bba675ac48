//! Tracing setup for test binaries.
//!
//! Sessions log lifecycle transitions at DEBUG and teardown failures at WARN.
//! Output goes through the test writer so `cargo test` captures it per test.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test: only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rust_sqlite_dbunit=debug,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init();
}
