//! Metrics and monitoring.
//!
//! Counters for the credential refresher, the image store, delivery
//! callbacks and proxied chat requests, exported in Prometheus text format,
//! plus component health checks behind `/health`.

mod collector;
mod health;
mod prometheus;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use health::{ComponentHealth, HealthCheckFn, HealthChecker, HealthStatus, SystemHealth};
pub use prometheus::PrometheusExporter;
