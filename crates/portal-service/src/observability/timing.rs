//! Timing metrics for participant activity.
//!
//! A timing metric is opened when an operation starts (a participant joins,
//! publishes a stream, subscribes) and closed when it ends. Closing emits one
//! structured `duration` event to the [`MetricSink`]:
//!
//! ```text
//! {"type":"duration","name":"publish_duration","start_time":..,"end_time":..,
//!  "time_cost":"1530ms","details":{"participant_id":"alice","stream_id":"s1",..}}
//! ```
//!
//! Instantaneous facts (`join`, `publish`, room rollups) are `normal` events.
//!
//! Metrics are grouped by scope (the participant id) and keyed by
//! (name, resource key) within the group, so a participant's leave can flush
//! everything it still has open.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Named attributes attached to a timing metric.
pub type MetricDetails = BTreeMap<String, String>;

/// Timed operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimingMetricName {
    /// From join to leave.
    ConferenceDuration,
    /// From publish to unpublish.
    PublishDuration,
    /// From subscribe to unsubscribe.
    SubscribeDuration,
}

impl TimingMetricName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TimingMetricName::ConferenceDuration => "conference_duration",
            TimingMetricName::PublishDuration => "publish_duration",
            TimingMetricName::SubscribeDuration => "subscribe_duration",
        }
    }
}

impl fmt::Display for TimingMetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event written to the metrics sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricEvent {
    Duration {
        name: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        time_cost: String,
        details: MetricDetails,
    },
    Normal {
        name: String,
        start_time: DateTime<Utc>,
        details: Value,
    },
}

impl MetricEvent {
    pub fn name(&self) -> &str {
        match self {
            MetricEvent::Duration { name, .. } | MetricEvent::Normal { name, .. } => name,
        }
    }
}

/// Destination for metric events. Produce-only.
pub trait MetricSink: Send + Sync {
    fn emit(&self, event: &MetricEvent);
}

/// Sink writing each event as one JSON line through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn emit(&self, event: &MetricEvent) {
        match serde_json::to_string(event) {
            Ok(line) => info!(target: "portal.metric", "{line}"),
            Err(e) => warn!(target: "portal.metric", error = %e, "Failed to serialize metric event"),
        }
    }
}

#[derive(Debug)]
struct TimingMetric {
    name: TimingMetricName,
    started_at: DateTime<Utc>,
    started: Instant,
    details: MetricDetails,
}

impl TimingMetric {
    fn finish(self) -> MetricEvent {
        let elapsed = self.started.elapsed();
        MetricEvent::Duration {
            name: self.name.as_str().to_string(),
            start_time: self.started_at,
            end_time: Utc::now(),
            time_cost: format!("{}ms", elapsed.as_millis()),
            details: self.details,
        }
    }
}

type MetricGroup = HashMap<(TimingMetricName, String), TimingMetric>;

/// Correlates start/finish of timed operations and emits their durations.
pub struct MetricsAggregator {
    groups: Mutex<HashMap<String, MetricGroup>>,
    sink: Arc<dyn MetricSink>,
}

impl MetricsAggregator {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Open a timing metric. An open metric with the same name and key in the
    /// scope is replaced without emitting.
    pub async fn start(
        &self,
        scope: &str,
        name: TimingMetricName,
        key: &str,
        details: MetricDetails,
    ) {
        let metric = TimingMetric {
            name,
            started_at: Utc::now(),
            started: Instant::now(),
            details,
        };
        self.groups
            .lock()
            .await
            .entry(scope.to_string())
            .or_default()
            .insert((name, key.to_string()), metric);
    }

    /// Add or overwrite an attribute on an open metric.
    ///
    /// Returns false if no such metric is open.
    pub async fn annotate(
        &self,
        scope: &str,
        name: TimingMetricName,
        key: &str,
        field: &str,
        value: impl Into<String>,
    ) -> bool {
        let mut groups = self.groups.lock().await;
        match groups
            .get_mut(scope)
            .and_then(|group| group.get_mut(&(name, key.to_string())))
        {
            Some(metric) => {
                metric.details.insert(field.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    /// Close a metric and emit its duration. No-op if it is not open.
    pub async fn finish(&self, scope: &str, name: TimingMetricName, key: &str) -> bool {
        let finished = {
            let mut groups = self.groups.lock().await;
            let Some(group) = groups.get_mut(scope) else {
                return false;
            };
            let metric = group.remove(&(name, key.to_string()));
            if group.is_empty() {
                groups.remove(scope);
            }
            metric
        };

        match finished {
            Some(metric) => {
                self.sink.emit(&metric.finish());
                true
            }
            None => false,
        }
    }

    /// Close every open metric in the scope. Returns how many were closed.
    pub async fn finish_all(&self, scope: &str) -> usize {
        let group = self.groups.lock().await.remove(scope);
        let Some(group) = group else {
            return 0;
        };

        let count = group.len();
        for metric in group.into_values() {
            self.sink.emit(&metric.finish());
        }
        count
    }

    /// Emit an instantaneous event.
    pub fn emit_counter(&self, name: &str, details: Value) {
        self.sink.emit(&MetricEvent::Normal {
            name: name.to_string(),
            start_time: Utc::now(),
            details,
        });
    }

    /// Names of the open metrics, per scope.
    pub async fn in_flight(&self) -> HashMap<String, Vec<TimingMetricName>> {
        self.groups
            .lock()
            .await
            .iter()
            .map(|(scope, group)| (scope.clone(), group.keys().map(|(name, _)| *name).collect()))
            .collect()
    }

    pub async fn is_open(&self, scope: &str, name: TimingMetricName, key: &str) -> bool {
        self.groups
            .lock()
            .await
            .get(scope)
            .is_some_and(|group| group.contains_key(&(name, key.to_string())))
    }

    /// Number of scopes with at least one open metric.
    pub async fn group_count(&self) -> usize {
        self.groups.lock().await.len()
    }
}

/// Build a details map from string pairs.
pub fn details<const N: usize>(pairs: [(&str, &str); N]) -> MetricDetails {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
