//! Delivery of envelope batches to the analytics backend.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::event::AnalyticsEnvelope;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Collector responded with status {0}")]
    Status(u16),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, batch: &[AnalyticsEnvelope]) -> Result<(), TransportError>;

    /// Called once when the publisher shuts down.
    async fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Writes each envelope as a structured log line on `beacon::analytics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, batch: &[AnalyticsEnvelope]) -> Result<(), TransportError> {
        for envelope in batch {
            let payload = serde_json::to_string(envelope)
                .map_err(|e| TransportError::Serialization(e.to_string()))?;
            info!(
                target: "beacon::analytics",
                event_id = %envelope.event_id,
                object_type = %envelope.object_type,
                payload = %payload,
                "analytics event"
            );
        }
        Ok(())
    }
}

/// POSTs batches as a JSON array to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(TransportError::Config(
                "collector endpoint must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, batch: &[AnalyticsEnvelope]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_rejects_empty_endpoint() {
        let result = HttpTransport::new("", Duration::from_secs(1));
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[test]
    fn test_http_transport_endpoint() {
        let transport =
            HttpTransport::new("http://collector.test/events", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.endpoint(), "http://collector.test/events");
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_log_transport_accepts_empty_batch() {
        assert!(LogTransport.deliver(&[]).await.is_ok());
        assert!(LogTransport.flush().await.is_ok());
    }

    #[test]
    fn test_transport_error_display() {
        assert!(TransportError::Status(502).to_string().contains("502"));
        assert!(TransportError::Connection("refused".into())
            .to_string()
            .contains("refused"));
    }
}
