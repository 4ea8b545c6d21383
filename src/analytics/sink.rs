//! Emission sinks.

use tokio::sync::mpsc;

use super::event::TelemetryEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Analytics buffer is full")]
    BufferFull,

    #[error("Analytics sink is closed")]
    Closed,

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives one event per handled request.
///
/// Implementations must not block: `emit` runs on the request path, and
/// also from a drop guard while a panic unwinds.
pub trait AnalyticsSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn emit(&self, event: TelemetryEvent) -> Result<(), SinkError>;
}

/// Discards everything. Used when analytics are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn emit(&self, _event: TelemetryEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Bounded queue in front of the background publisher.
#[derive(Debug, Clone)]
pub struct BufferedSink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl BufferedSink {
    pub fn new(tx: mpsc::Sender<TelemetryEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl AnalyticsSink for BufferedSink {
    fn name(&self) -> &'static str {
        "buffered"
    }

    fn emit(&self, event: TelemetryEvent) -> Result<(), SinkError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
