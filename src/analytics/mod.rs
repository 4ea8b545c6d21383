//! Per-request analytics: context capture, event assembly, and emission.

pub mod context;
pub mod event;
pub mod outcome;
pub mod publisher;
pub mod sink;
pub mod transport;
pub mod wrapper;

pub use context::RequestContext;
pub use event::{AnalyticsEnvelope, ObjectState, TelemetryEvent, DEFAULT_OBJECT_TYPE};
pub use outcome::{ReportOutcome, ResponseOutcome, CLIENT_CLOSED_REQUEST};
pub use publisher::{AnalyticsPublisher, AnalyticsPublisherBuilder, PublishError, PublisherHandle};
pub use sink::{AnalyticsSink, BufferedSink, NoopSink, SinkError};
pub use transport::{HttpTransport, LogTransport, Transport, TransportError};
pub use wrapper::RequestTelemetry;
