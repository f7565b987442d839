//! Logging bootstrap for embedding hosts.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialise tracing to stderr with `RUST_LOG`-style filtering.
///
/// Safe to call more than once; only the first call installs the
/// subscriber. Hosts that manage their own subscriber can skip this.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    });
}
