use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome
/// (admitted | RESOURCE_UNAVAILABLE | OUTSIDE_HOURS | INVALID_INTERVAL | OVERLAP).
pub const ADMISSIONS_TOTAL: &str = "pitchlock_admissions_total";

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "pitchlock_availability_queries_total";

/// Counter: reservations removed (cancellation or retention sweep).
pub const CANCELLATIONS_TOTAL: &str = "pitchlock_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: fields currently registered with the engine.
pub const FIELDS_ACTIVE: &str = "pitchlock_fields_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "pitchlock_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "pitchlock_journal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if `port` is
/// None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
