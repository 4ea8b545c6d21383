//! Request telemetry wrapper.
//!
//! [`RequestTelemetry::observe`] runs a delegate future and emits exactly one
//! [`TelemetryEvent`] when it finishes, whichever way it finishes:
//!
//! - the delegate returns: the outcome of its value (response or error);
//! - the delegate panics: `500` with [`ErrorKind::Panic`], and the panic keeps
//!   unwinding;
//! - the future is dropped before completion (client went away, outer
//!   timeout): `499` with [`ErrorKind::ClientDisconnected`].
//!
//! Emission happens in a drop guard, so every exit path is covered. Sink
//! failures are logged and counted, never propagated.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::event::TelemetryEvent;
use super::outcome::{ReportOutcome, ResponseOutcome};
use super::sink::AnalyticsSink;
use crate::auth::DEFAULT_HANDLE_DOMAIN;
use crate::error::ErrorKind;
use crate::telemetry::metrics::{record_analytics_event, record_request_latency, EmitOutcome};

#[derive(Clone)]
pub struct RequestTelemetry {
    sink: Arc<dyn AnalyticsSink>,
    default_domain: Arc<str>,
}

impl RequestTelemetry {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            sink,
            default_domain: Arc::from(DEFAULT_HANDLE_DOMAIN),
        }
    }

    pub fn with_default_domain(mut self, domain: impl Into<String>) -> Self {
        self.default_domain = Arc::from(domain.into());
        self
    }

    pub fn default_domain(&self) -> &str {
        &self.default_domain
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Awaits `delegate` and returns its output unchanged, emitting one event
    /// on the way out.
    pub async fn observe<F, T>(&self, context: RequestContext, delegate: F) -> T
    where
        F: Future<Output = T>,
        T: ReportOutcome,
    {
        let mut guard = FinalizeGuard::arm(self, context);
        let mut delegate = std::pin::pin!(delegate);

        // `polling` stays set if the delegate panics mid-poll, so a panic
        // caught by an outer layer is still reported as one.
        let output = std::future::poll_fn(|cx| {
            guard.polling = true;
            let poll = delegate.as_mut().poll(cx);
            guard.polling = false;
            poll
        })
        .await;

        guard.record(output.outcome());
        output
    }

    pub fn assemble(&self, context: &RequestContext, outcome: &ResponseOutcome) -> TelemetryEvent {
        TelemetryEvent::assemble(context, outcome, &self.default_domain)
    }

    fn finalize(&self, context: &RequestContext, outcome: ResponseOutcome, started: Instant) {
        record_request_latency(
            &context.method,
            &context.handler,
            outcome.status_code,
            started.elapsed(),
        );

        let event = self.assemble(context, &outcome);
        let event_id = event.event_id;
        let sink = &self.sink;

        // A sink panic while already unwinding would abort; only the sink's
        // own panics on the normal path are caught here.
        match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(event))) {
            Ok(Ok(())) => {
                debug!(
                    %event_id,
                    status = outcome.status_code,
                    handler = %context.handler,
                    "Analytics event emitted"
                );
                record_analytics_event(EmitOutcome::Emitted);
            }
            Ok(Err(e)) => {
                warn!(
                    %event_id,
                    sink = sink.name(),
                    error = %e,
                    "Dropped analytics event"
                );
                record_analytics_event(EmitOutcome::Dropped);
            }
            Err(_) => {
                warn!(%event_id, sink = sink.name(), "Analytics sink panicked");
                record_analytics_event(EmitOutcome::Failed);
            }
        }
    }
}

impl std::fmt::Debug for RequestTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTelemetry")
            .field("sink", &self.sink.name())
            .field("default_domain", &self.default_domain)
            .finish()
    }
}

/// Emits on drop. `outcome` stays `None` unless the delegate returned.
struct FinalizeGuard<'a> {
    telemetry: &'a RequestTelemetry,
    context: Option<RequestContext>,
    outcome: Option<ResponseOutcome>,
    polling: bool,
    started: Instant,
}

impl<'a> FinalizeGuard<'a> {
    fn arm(telemetry: &'a RequestTelemetry, context: RequestContext) -> Self {
        Self {
            telemetry,
            context: Some(context),
            outcome: None,
            polling: false,
            started: Instant::now(),
        }
    }

    fn record(&mut self, outcome: ResponseOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        let outcome = self.outcome.take().unwrap_or_else(|| {
            if self.polling || std::thread::panicking() {
                ResponseOutcome::panicked()
            } else {
                ResponseOutcome::client_disconnected()
            }
        });

        if matches!(
            outcome.error_kind,
            Some(ErrorKind::Panic | ErrorKind::ClientDisconnected)
        ) {
            debug!(
                method = %context.method,
                path = %context.path,
                kind = ?outcome.error_kind,
                "Request ended without a response"
            );
        }

        self.telemetry.finalize(&context, outcome, self.started);
    }
}
