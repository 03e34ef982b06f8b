use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "stayd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "stayd_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "stayd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "stayd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "stayd_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayd_wal_flush_batch_size";

/// Counter: ledger mirror attempts that failed at the sink.
pub const LEDGER_FAILURES_TOTAL: &str = "stayd_ledger_failures_total";

/// Counter: ledger entries dropped because the queue was full.
pub const LEDGER_DROPPED_TOTAL: &str = "stayd_ledger_dropped_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertUnit { .. } => "insert_unit",
        Command::UpdateUnit { .. } => "update_unit",
        Command::DeleteUnit { .. } => "delete_unit",
        Command::SelectUnits { .. } => "select_units",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::CancelReservation { .. } => "cancel_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectReservations { .. } => "select_reservations",
        Command::InsertPayment { .. } => "insert_payment",
        Command::SelectPayments { .. } => "select_payments",
        Command::SelectAvailability { .. } => "select_availability",
        Command::IssueAccessCode { .. } => "issue_access_code",
        Command::SelectHealth => "select_health",
    }
}
