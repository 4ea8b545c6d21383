//! Telemetry event and its wire envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::RequestContext;
use super::outcome::ResponseOutcome;
use crate::auth::derive_handle;
use crate::error::ErrorKind;

pub const DEFAULT_OBJECT_TYPE: &str = "http_request";

/// One record per handled request. Built after the delegate finishes and
/// handed to the sink by value.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub path: String,
    pub handler: String,
    pub method: String,
    pub status_code: u16,
    pub user_agent: String,
    pub ip_address: String,
    pub account_handle: Option<String>,
    pub account_id: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl TelemetryEvent {
    pub fn assemble(
        context: &RequestContext,
        outcome: &ResponseOutcome,
        default_domain: &str,
    ) -> Self {
        let principal = context.principal.as_ref();

        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: principal.map(|p| p.user_id.clone()),
            path: context.path.clone(),
            handler: context.handler.clone(),
            method: context.method.clone(),
            status_code: outcome.status_code,
            user_agent: context.user_agent.clone(),
            ip_address: context.client_ip.to_string(),
            account_handle: derive_handle(principal, default_domain),
            account_id: principal.and_then(|p| p.account_id()).map(str::to_string),
            error_kind: outcome.error_kind,
        }
    }

    pub fn object_state(&self) -> ObjectState {
        ObjectState {
            user_id: self.user_id.clone(),
            path: self.path.clone(),
            controller: self.handler.clone(),
            method: self.method.clone(),
            status_code: self.status_code,
        }
    }

    pub fn to_envelope(&self, object_type: &str) -> Result<AnalyticsEnvelope, serde_json::Error> {
        Ok(AnalyticsEnvelope {
            event_id: self.event_id,
            timestamp: self.timestamp,
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
            object_type: object_type.to_string(),
            object_state: serde_json::to_string(&self.object_state())?,
            identifiers_mastodon_account_handle: self.account_handle.clone(),
            identifiers_mastodon_account_id: self.account_id.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub user_id: Option<String>,
    pub path: String,
    pub controller: String,
    pub method: String,
    pub status_code: u16,
}

/// Serialized transport form. `object_state` is itself a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEnvelope {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub ip_address: String,
    pub object_type: String,
    pub object_state: String,
    pub identifiers_mastodon_account_handle: Option<String>,
    pub identifiers_mastodon_account_id: Option<String>,
}

impl AnalyticsEnvelope {
    pub fn decode_state(&self) -> Result<ObjectState, serde_json::Error> {
        serde_json::from_str(&self.object_state)
    }
}
