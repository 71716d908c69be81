use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::BuildError;

use crate::engine::BookingError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations executed. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "clubbook_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "clubbook_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: sessions and classes that still hold their timelines.
pub const ACTIVE_BOOKINGS: &str = "clubbook_active_bookings";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clubbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "clubbook_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Latency timer for one service operation; `finish` records the outcome.
pub struct OpTimer {
    operation: &'static str,
    start: Instant,
}

impl OpTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Record count and latency, labelled `ok` or with the error kind.
    pub fn finish<T>(self, result: &Result<T, BookingError>) {
        let status = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(OPERATIONS_TOTAL, "operation" => self.operation, "status" => status)
            .increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => self.operation)
            .record(self.start.elapsed().as_secs_f64());
    }
}
