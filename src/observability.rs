use std::net::SocketAddr;

use crate::model::Event;

// ── Admission and lifecycle ─────────────────────────────────────

/// Counter: admission decisions. Labels: outcome (`allowed` or the first violation code).
pub const ADMISSIONS_TOTAL: &str = "clubstay_admissions_total";

/// Counter: journaled lifecycle events. Labels: transition.
pub const TRANSITIONS_TOTAL: &str = "clubstay_transitions_total";

/// Counter: reservations cancelled by the expiration sweep.
pub const EXPIRED_TOTAL: &str = "clubstay_expired_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clubstay_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "clubstay_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an event to a short label for metrics.
pub fn transition_label(event: &Event) -> &'static str {
    match event {
        Event::Confirmed { .. } => "confirmed",
        Event::CheckedIn { .. } => "checked_in",
        Event::CheckedOut { .. } => "checked_out",
        Event::Cancelled { .. } => "cancelled",
        Event::PaymentRecorded { .. } => "payment_recorded",
        Event::PaymentDeadlineApproaching { .. } => "deadline_reminder",
    }
}
