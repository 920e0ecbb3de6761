//! Prometheus metrics for sync runs and the webhook receiver

use crate::{AgileSyncError, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter,
    CounterVec, Encoder, Gauge, HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    /// Histogram: bulk sync duration (seconds)
    pub static ref SYNC_DURATION: HistogramVec = register_histogram_vec!(
        "agilesync_sync_duration_seconds",
        "Duration of bulk agile sync runs",
        &["mode"],
        vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    )
    .expect("Failed to create sync_duration metric");

    /// Counter: bulk sync runs by outcome
    pub static ref SYNC_RUNS: CounterVec = register_counter_vec!(
        "agilesync_sync_runs_total",
        "Total bulk sync runs by status",
        &["status"]
    )
    .expect("Failed to create sync_runs metric");

    /// Counter: records written to the pipe
    pub static ref RECORDS_WRITTEN: CounterVec = register_counter_vec!(
        "agilesync_records_written_total",
        "Records written to the pipe by kind",
        &["kind"]
    )
    .expect("Failed to create records_written metric");

    /// Counter: sprints skipped because an earlier run already emitted them
    pub static ref SPRINTS_SKIPPED: CounterVec = register_counter_vec!(
        "agilesync_sprints_skipped_total",
        "Closed sprints skipped by incremental runs",
        &["reason"]
    )
    .expect("Failed to create sprints_skipped metric");

    /// Counter: kanban issues whose status maps to no column, across all boards
    pub static ref ISSUES_UNMAPPED: IntCounter = register_int_counter!(
        "agilesync_issues_unmapped_total",
        "Kanban issues left out for lack of a column"
    )
    .expect("Failed to create issues_unmapped metric");

    /// Counter: webhook deliveries by event and outcome
    pub static ref WEBHOOK_EVENTS: CounterVec = register_counter_vec!(
        "agilesync_webhook_events_total",
        "Webhook events processed by event and status",
        &["event", "status"]
    )
    .expect("Failed to create webhook_events metric");

    /// Gauge: unix time of the last successful bulk sync
    pub static ref LAST_SYNC_SUCCESS: Gauge = register_gauge!(
        "agilesync_last_sync_success_timestamp_seconds",
        "Unix time of the last successful bulk sync"
    )
    .expect("Failed to create last_sync_success metric");
}

/// Record a finished bulk sync
pub fn record_sync(historical: bool, duration_secs: f64, success: bool) {
    let mode = if historical { "historical" } else { "incremental" };
    SYNC_DURATION.with_label_values(&[mode]).observe(duration_secs);
    let status = if success { "success" } else { "failure" };
    SYNC_RUNS.with_label_values(&[status]).inc();
    if success {
        LAST_SYNC_SUCCESS.set(chrono::Utc::now().timestamp() as f64);
    }
}

/// Count one record written to the pipe
pub fn record_written(kind: &str) {
    RECORDS_WRITTEN.with_label_values(&[kind]).inc();
}

pub fn record_sprint_skipped() {
    SPRINTS_SKIPPED.with_label_values(&["already_synced"]).inc();
}

pub fn record_unmapped_issues(count: usize) {
    ISSUES_UNMAPPED.inc_by(count as u64);
}

/// Count one webhook delivery
pub fn record_webhook(event: &str, status: &str) {
    WEBHOOK_EVENTS.with_label_values(&[event, status]).inc();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AgileSyncError::Other(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| AgileSyncError::Other(format!("metrics are not UTF-8: {}", e)))
}
