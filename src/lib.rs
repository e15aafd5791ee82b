// src/lib.rs
// Public library surface shared by both binaries and the integration tests.

pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod history;
pub mod report;

// Relay side: runs the watch binary and forwards its output
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::{Credentials, WatchConfig};
pub use crate::controller::{RunController, RunOutcome, RunPhase};
pub use crate::diff::{diff, DiffResult};
pub use crate::error::{WatchError, WatchResult};
pub use crate::extract::{EventExtractor, EventRecord, ExtractedSet};
pub use crate::history::{Capture, SnapshotStore};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "opportunity_watch=info,warn";

/// Install the tracing subscriber. Logs always go to stderr: stdout carries
/// nothing but the change report.
///
/// `RUST_LOG` overrides the default `opportunity_watch=info,warn`. Calling
/// this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}
