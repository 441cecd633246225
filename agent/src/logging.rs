//! Development-time tracing.
//!
//! Tracing output goes to stderr and is filtered by `RUST_LOG`. It is not the
//! run record: every run also writes `meta.json`, `transcript.json` and
//! `status.md` under the configured runs directory (see `io/transcript`),
//! regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=issue_agent=debug issue-agent run acme widgets 42
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
