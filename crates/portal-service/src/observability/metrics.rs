//! Prometheus metrics for the portal.
//!
//! All metrics follow Prometheus naming conventions:
//! - `portal_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: the router's method set (~12 values)
//! - `status`: `success` plus the error labels of `PortalError` (~8 values)
//! - `method`: RPC method names (~11 values)
//! - `result`: token validation outcomes (4 values)
//!
//! Participant, room and controller ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Router operations include the remote call, so use RPC-style buckets
        .set_buckets_for_metric(
            Matcher::Prefix("portal_operation".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set operation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("portal_rpc".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set RPC buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Router Operations
// ============================================================================

/// Record a completed router operation.
///
/// Metrics: `portal_operations_total`, `portal_operation_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_operation(operation: &'static str, status: &'static str, duration: Duration) {
    counter!("portal_operations_total", "operation" => operation, "status" => status)
        .increment(1);
    histogram!("portal_operation_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

/// Record a token validation outcome.
///
/// Metric: `portal_token_validations_total`
/// Labels: `result` (success, invalid_signature, invalid_token, store_error)
pub fn record_token_validation(result: &'static str) {
    counter!("portal_token_validations_total", "result" => result).increment(1);
}

/// Record a failed best-effort leave notification to a controller.
///
/// Metric: `portal_controller_notify_failures_total`
pub fn record_controller_notify_failure() {
    counter!("portal_controller_notify_failures_total").increment(1);
}

// ============================================================================
// RPC
// ============================================================================

/// Record an outgoing RPC.
///
/// Metrics: `portal_rpc_calls_total`, `portal_rpc_duration_seconds`
/// Labels: `method`, `status`
pub fn record_rpc_call(method: &str, status: &'static str, duration: Duration) {
    counter!("portal_rpc_calls_total", "method" => method.to_string(), "status" => status)
        .increment(1);
    histogram!("portal_rpc_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of participants admitted by this portal.
///
/// Metric: `portal_participants_active`
pub fn set_participants_active(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("portal_participants_active").set(count as f64);
}

/// Set the number of rooms with at least one participant on this portal.
///
/// Metric: `portal_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("portal_rooms_active").set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_record_operation_counts_by_status() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_operation("join", "success", Duration::from_millis(20));
            record_operation("join", "success", Duration::from_millis(30));
            record_operation("join", "invalid_token", Duration::from_millis(5));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let success = snapshot
            .iter()
            .find(|(key, _, _, _)| {
                key.key().name() == "portal_operations_total"
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status" && l.value() == "success")
            })
            .map(|(_, _, _, value)| value);
        assert!(matches!(success, Some(DebugValue::Counter(2))));

        let histograms = snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "portal_operation_duration_seconds")
            .count();
        assert_eq!(histograms, 1);
    }

    #[test]
    fn test_gauges_and_counters_do_not_panic_without_recorder() {
        record_token_validation("success");
        record_token_validation("invalid_signature");
        record_controller_notify_failure();
        record_rpc_call("join", "success", Duration::from_millis(3));
        set_participants_active(5);
        set_rooms_active(2);
    }

    #[test]
    fn test_participants_gauge_value() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_participants_active(7);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let value = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "portal_participants_active")
            .map(|(_, _, _, value)| value);
        assert!(
            matches!(value, Some(DebugValue::Gauge(v)) if (v.into_inner() - 7.0).abs() < f64::EPSILON)
        );
    }
}
