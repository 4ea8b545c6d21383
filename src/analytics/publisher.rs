//! Background publisher that drains the sink buffer to a transport.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use super::event::{TelemetryEvent, DEFAULT_OBJECT_TYPE};
use super::sink::BufferedSink;
use super::transport::Transport;
use crate::telemetry::metrics::{record_delivery, DeliveryOutcome};

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub object_type: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            object_type: DEFAULT_OBJECT_TYPE.to_string(),
        }
    }
}

pub struct AnalyticsPublisher {
    rx: mpsc::Receiver<TelemetryEvent>,
    transport: Arc<dyn Transport>,
    config: PublisherConfig,
}

impl AnalyticsPublisher {
    pub fn new(
        rx: mpsc::Receiver<TelemetryEvent>,
        transport: Arc<dyn Transport>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            rx,
            transport,
            config,
        }
    }

    pub fn spawn(self) -> PublisherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        PublisherHandle { shutdown_tx, task }
    }

    #[instrument(skip(self, shutdown_rx), name = "analytics_publisher", fields(transport = self.transport.name()))]
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "Analytics publisher started"
        );

        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<TelemetryEvent> = Vec::with_capacity(batch_size);
        // `interval` panics on a zero period.
        let mut flush_timer = interval(self.config.flush_interval.max(MIN_FLUSH_INTERVAL));

        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    match received {
                        Some(event) => {
                            batch.push(event);
                            if batch.len() >= batch_size {
                                self.deliver(&mut batch).await;
                            }
                        }
                        None => {
                            debug!("All analytics senders dropped");
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if !batch.is_empty() {
                        self.deliver(&mut batch).await;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Analytics publisher received shutdown signal");
                        break;
                    }
                }
            }
        }

        // Late emitters get SinkError::Closed from here on.
        self.rx.close();

        info!("Draining buffered analytics events...");
        while let Some(event) = self.rx.recv().await {
            batch.push(event);
            if batch.len() >= batch_size {
                self.deliver(&mut batch).await;
            }
        }
        if !batch.is_empty() {
            self.deliver(&mut batch).await;
        }

        if let Err(e) = self.transport.flush().await {
            warn!(error = %e, "Error flushing analytics transport");
        }

        info!("Analytics publisher stopped");
    }

    async fn deliver(&self, batch: &mut Vec<TelemetryEvent>) -> usize {
        let events = std::mem::take(batch);

        let envelopes: Vec<_> = events
            .iter()
            .filter_map(|event| match event.to_envelope(&self.config.object_type) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Failed to serialize analytics event");
                    None
                }
            })
            .collect();

        if envelopes.is_empty() {
            return 0;
        }

        let count = envelopes.len();
        match self.transport.deliver(&envelopes).await {
            Ok(()) => {
                debug!(count, "Delivered analytics batch");
                record_delivery(self.transport.name(), DeliveryOutcome::Success, count);
                count
            }
            Err(e) => {
                error!(count, error = %e, "Failed to deliver analytics batch");
                record_delivery(self.transport.name(), DeliveryOutcome::Failure, count);
                0
            }
        }
    }
}

pub struct PublisherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Signals shutdown and waits for the drain to finish.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), PublishError> {
        let _ = self.shutdown_tx.send(true);

        tokio::time::timeout(timeout, self.task)
            .await
            .map_err(|_| PublishError::ShutdownTimeout(timeout))?
            .map_err(|e| PublishError::Task(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publisher did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Task error: {0}")]
    Task(String),
}

pub struct AnalyticsPublisherBuilder {
    transport: Arc<dyn Transport>,
    config: PublisherConfig,
}

impl AnalyticsPublisherBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: PublisherConfig::default(),
        }
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn flush_interval(mut self, duration: Duration) -> Self {
        self.config.flush_interval = duration;
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.config.object_type = object_type.into();
        self
    }

    pub fn build(self) -> (BufferedSink, AnalyticsPublisher) {
        let (sink, rx) = BufferedSink::channel(self.config.buffer_capacity);
        let publisher = AnalyticsPublisher::new(rx, self.transport, self.config);
        (sink, publisher)
    }

    pub fn spawn(self) -> (BufferedSink, PublisherHandle) {
        let (sink, publisher) = self.build();
        (sink, publisher.spawn())
    }
}
