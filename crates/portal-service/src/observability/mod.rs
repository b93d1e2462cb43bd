//! Observability: Prometheus metrics, timing events, health endpoints.

pub mod health;
pub mod metrics;
pub mod timing;

pub use health::{health_router, metrics_router, HealthState};
pub use timing::{
    MetricDetails, MetricEvent, MetricSink, MetricsAggregator, TimingMetricName,
    TracingMetricSink,
};
