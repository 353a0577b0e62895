//! Structured logging initialization for the PayOS server.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Wrapper around the process-wide tracing subscriber.
///
/// Kept as a type (rather than a bare function call) so `main.rs` can hold
/// it for the lifetime of the process, the way a telemetry handle is usually
/// threaded through for graceful shutdown.
pub struct Telemetry;

impl Telemetry {
    /// Initializes the global `tracing` subscriber from `RUST_LOG` (default `info`).
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Telemetry
    }
}
