//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{record_analytics_event, record_delivery, MetricsState};
pub use tracing::{init_telemetry, shutdown_telemetry};
