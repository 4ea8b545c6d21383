//! Beacon - guaranteed-emission request analytics for axum services.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod telemetry;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use analytics::{
    AnalyticsPublisherBuilder, AnalyticsSink, HttpTransport, LogTransport, NoopSink,
    PublisherHandle, RequestTelemetry, Transport, TransportError,
};
use auth::{PrincipalTokens, TokenError};
use config::{AnalyticsConfig, AnalyticsTransportKind};
use error::AppError;
use middleware::{
    rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitState},
    request_telemetry_middleware, require_account, resolve_principal_middleware,
};
use telemetry::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: RequestTelemetry,
    pub tokens: Option<PrincipalTokens>,
    pub rate_limit: RateLimitState,
    pub metrics: MetricsState,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(sink: Arc<dyn AnalyticsSink>, config: &Config) -> Result<Self, TokenError> {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(RateLimitConfig::new(
                config.security.rate_limit_requests_per_minute,
                60,
            ))
        } else {
            RateLimitState::disabled()
        };
        let rate_limit = rate_limit.with_trust_forwarded_for(config.analytics.trust_forwarded_for);

        let tokens = config
            .auth
            .jwt_public_key
            .as_deref()
            .map(|key| {
                PrincipalTokens::from_public_key_b64(key).map(|t| {
                    t.with_issuer(config.auth.jwt_issuer.clone())
                        .with_audience(config.auth.jwt_audience.clone())
                })
            })
            .transpose()?;

        let telemetry =
            RequestTelemetry::new(sink).with_default_domain(config.analytics.default_domain.clone());

        Ok(Self {
            telemetry,
            tokens,
            rate_limit,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
            trust_forwarded_for: config.analytics.trust_forwarded_for,
        })
    }

    pub fn with_tokens(mut self, tokens: PrincipalTokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitState) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// Builds the configured sink. The publisher handle must be shut down at
/// exit to flush buffered events.
pub fn build_analytics(
    config: &AnalyticsConfig,
) -> Result<(Arc<dyn AnalyticsSink>, Option<PublisherHandle>), TransportError> {
    if !config.enabled {
        info!("Analytics disabled");
        return Ok((Arc::new(NoopSink), None));
    }

    let transport: Arc<dyn Transport> = match config.transport {
        AnalyticsTransportKind::Log => Arc::new(LogTransport),
        AnalyticsTransportKind::Http => Arc::new(HttpTransport::new(
            config.endpoint.clone().unwrap_or_default(),
            config.http_timeout(),
        )?),
    };

    info!(
        transport = transport.name(),
        buffer_capacity = config.buffer_capacity,
        "Analytics enabled"
    );

    let (sink, handle) = AnalyticsPublisherBuilder::new(transport)
        .buffer_capacity(config.buffer_capacity)
        .batch_size(config.batch_size)
        .flush_interval(config.flush_interval())
        .object_type(config.object_type.clone())
        .spawn();

    Ok((Arc::new(sink), Some(handle)))
}

pub fn create_router(state: AppState, config: &Config) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(state.metrics.clone()),
        )
        .with_state(state.clone());

    let account_routes = Router::new()
        .route(
            "/api/v1/accounts/verify_credentials",
            get(handlers::accounts::verify_credentials),
        )
        .route_layer(axum_middleware::from_fn(require_account))
        .with_state(state.clone());

    let app = Router::new().merge(public_routes).merge(account_routes);

    instrument(app, &state, config)
}

/// Wraps any router with the analytics stack. From the outside in: CORS,
/// body limit, tracing, panic recovery, principal resolution, the telemetry
/// wrapper, timeout, rate limiting. Everything inside the wrapper is
/// reported with the status it produced.
pub fn instrument(router: Router, state: &AppState, config: &Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    router
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ))
        .layer(timeout)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            request_telemetry_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_principal_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(trace_layer)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> AppError {
    AppError::not_found("Not found")
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let max_age = Duration::from_secs(config.cors.max_age_secs);

    if config.cors.allowed_origins.is_empty() || config.cors.allowed_origins.iter().any(|o| o == "*")
    {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(max_age);
    }

    let origins: Vec<_> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(max_age)
}

pub fn init_tracing(config: &Config) {
    telemetry::init_telemetry(config);
}

pub use config::Config;
pub use telemetry::shutdown_telemetry;

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::{SinkError, TelemetryEvent};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl AnalyticsSink for MemorySink {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn emit(&self, event: TelemetryEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn instrumented(routes: Router) -> (Arc<MemorySink>, Router) {
        let config = Config::default_for_testing();
        let sink = Arc::new(MemorySink::default());
        let state = AppState::new(sink.clone(), &config).unwrap();
        (sink, instrument(routes, &state, &config))
    }

    #[tokio::test]
    async fn test_instrument_records_matched_route() {
        let (sink, app) = instrumented(Router::new().route("/v1/test", get(|| async { "ok" })));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test?page=2")
                    .header("user-agent", "oneshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].handler, "/v1/test");
        assert_eq!(events[0].path, "/v1/test?page=2");
        assert_eq!(events[0].user_agent, "oneshot");
        // No ConnectInfo without a real listener.
        assert_eq!(events[0].ip_address, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_instrument_fallback_is_not_found() {
        let (sink, app) = instrumented(Router::new());

        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].handler, "unmatched");
        assert_eq!(events[0].status_code, 404);
    }

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone + Send + Sync>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_app_state_rejects_bad_public_key() {
        let mut config = Config::default_for_testing();
        config.auth.jwt_public_key = Some("%%%".to_string());
        assert!(AppState::new(Arc::new(NoopSink), &config).is_err());
    }

    #[test]
    fn test_app_state_without_key_is_anonymous_only() {
        let config = Config::default_for_testing();
        let state = AppState::new(Arc::new(NoopSink), &config).unwrap();
        assert!(state.tokens.is_none());
        assert!(state.rate_limit.limiter.is_none());
        assert_eq!(state.telemetry.sink_name(), "noop");
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let config = Config::default_for_testing();
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_analytics_disabled() {
        let mut config = Config::default_for_testing();
        config.analytics.enabled = false;
        let (sink, handle) = build_analytics(&config.analytics).unwrap();
        assert_eq!(sink.name(), "noop");
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_build_analytics_log_transport() {
        let config = Config::default_for_testing();
        let (sink, handle) = build_analytics(&config.analytics).unwrap();
        assert_eq!(sink.name(), "buffered");
        handle
            .expect("publisher should be running")
            .shutdown(Duration::from_secs(5))
            .await
            .unwrap();
    }
}
