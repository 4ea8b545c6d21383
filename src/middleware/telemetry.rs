//! Axum adapter for the request telemetry wrapper.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::analytics::RequestContext;
use crate::AppState;

/// Emits one analytics event per request. Must sit inside principal
/// resolution and outside anything that can fail the request.
pub async fn request_telemetry_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::from_request(&request, state.trust_forwarded_for);
    state.telemetry.observe(context, next.run(request)).await
}
