//! Account endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::middleware::CurrentPrincipal;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub user_id: String,
    pub account_id: Option<String>,
    pub username: Option<String>,
    pub handle: Option<String>,
}

/// Echoes the resolved principal. Mounted behind `require_account`.
pub async fn verify_credentials(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Json<CredentialsResponse> {
    Json(CredentialsResponse {
        handle: principal.handle(state.telemetry.default_domain()),
        account_id: principal.account_id().map(str::to_string),
        username: principal.username().map(str::to_string),
        user_id: principal.user_id,
    })
}
