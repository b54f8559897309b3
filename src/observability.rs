use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::model::Status;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: records inserted. Labels: status.
pub const RECORDS_INSERTED_TOTAL: &str = "slotwise_records_inserted_total";

/// Counter: exact-span duplicates moved to Cancelled.
pub const DUPLICATES_CANCELLED_TOTAL: &str = "slotwise_duplicates_cancelled_total";

/// Counter: duplicates whose cancellation failed.
pub const DUPLICATE_RESOLUTION_FAILURES_TOTAL: &str = "slotwise_duplicate_resolution_failures_total";

/// Counter: inserts rejected before persistence. Labels: reason.
pub const INSERTS_REJECTED_TOTAL: &str = "slotwise_inserts_rejected_total";

/// Histogram: query latency in seconds. Labels: query.
pub const QUERY_DURATION_SECONDS: &str = "slotwise_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotwise_wal_compactions_total";

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_filter`.
/// Returns false if a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .try_init()
        .is_ok()
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a status to a short label for metrics.
pub fn status_label(status: Status) -> &'static str {
    match status {
        Status::Available => "available",
        Status::Unavailable => "unavailable",
        Status::Cancelled => "cancelled",
    }
}
