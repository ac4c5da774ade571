use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static WORKER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes process-wide structured JSON logging at `level`.
///
/// Mirrors the non-blocking-writer pattern used throughout this corpus:
/// `tracing-appender` hands back a `WorkerGuard` that must outlive the
/// process for buffered lines to actually get flushed, so it is stashed in
/// a static rather than dropped at the end of this function.
pub fn init(level: &str) {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = WORKER_GUARD.set(guard);

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = fmt::layer().json().with_writer(writer).with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .try_init();
}
