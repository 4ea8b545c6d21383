//! Common test utilities for integration tests.
//!
//! Every [`TestApp`] runs a real server on a random port with a
//! [`RecordingSink`] in place of the publisher, so tests can assert on the
//! exact events each request produced.

#![allow(dead_code)]

use axum::Router;
use jwt_simple::prelude::Ed25519KeyPair;
use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use beacon::analytics::{AnalyticsSink, SinkError, TelemetryEvent};
use beacon::auth::{Principal, PrincipalTokens};
use beacon::{create_router, AppState, Config};

/// Signing key shared by all tests. The server only ever sees the public half.
pub static TEST_TOKENS: Lazy<PrincipalTokens> =
    Lazy::new(|| PrincipalTokens::from_key_pair(Ed25519KeyPair::generate()));

/// Captures events in memory. Can be switched to reject everything to
/// simulate an unavailable backend.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AnalyticsSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn emit(&self, event: TelemetryEvent) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("backend down".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// A test application instance with its own HTTP client and base URL.
pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub sink: Arc<RecordingSink>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Config::default_for_testing()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        Self::spawn_custom(config, RecordingSink::default(), create_router).await
    }

    /// Spawns a server whose router is produced by `build`, which receives
    /// the fully wired state.
    pub async fn spawn_custom<F>(config: Config, sink: RecordingSink, build: F) -> Self
    where
        F: FnOnce(AppState, &Config) -> Router,
    {
        let sink = Arc::new(sink);
        let state = AppState::new(sink.clone(), &config)
            .expect("Failed to build app state")
            .with_tokens(TEST_TOKENS.clone());
        let app = build(state, &config);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://127.0.0.1:{}", port),
            sink,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_public(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn get_authenticated(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Waits until at least `count` events were recorded.
    pub async fn wait_for_events(&self, count: usize) -> Vec<TelemetryEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let events = self.sink.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits for exactly one event and returns it.
    pub async fn single_event(&self) -> TelemetryEvent {
        self.wait_for_events(1).await;
        // Nothing else may arrive late.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut events = self.sink.events();
        assert_eq!(events.len(), 1, "Expected exactly one event, got {events:?}");
        events.remove(0)
    }
}

pub fn issue_token(principal: &Principal) -> String {
    TEST_TOKENS.issue(principal).expect("Failed to issue token")
}

pub fn account_token(user_id: &str, username: &str, domain: Option<&str>) -> String {
    issue_token(&Principal::new(user_id).with_account(
        format!("acct-{user_id}"),
        Some(username),
        domain,
    ))
}

/// Asserts that a response has the expected status code.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $expected:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            $expected,
            "Expected status {}, got {}",
            $expected,
            $response.status()
        );
    };
}

/// Asserts that a response is successful (2xx).
#[macro_export]
macro_rules! assert_success {
    ($response:expr) => {
        assert!(
            $response.status().is_success(),
            "Expected success, got status {}",
            $response.status()
        );
    };
}
