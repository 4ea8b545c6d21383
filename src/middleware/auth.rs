//! Principal resolution and authentication guards.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::Principal;
use crate::error::AppError;
use crate::AppState;

/// Resolves the bearer token into a [`Principal`] stored in the request
/// extensions. Never rejects: a missing or invalid token leaves the request
/// anonymous and the guards decide.
pub async fn resolve_principal_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(tokens) = &state.tokens {
        let bearer = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        if let Some(token) = bearer {
            match tokens.verify(token) {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                }
                Err(e) => debug!(error = %e, "Ignoring unverifiable bearer token"),
            }
        }
    }

    next.run(req).await
}

/// Route guard: anonymous requests get 401.
pub async fn require_principal(req: Request, next: Next) -> Result<Response, AppError> {
    if req.extensions().get::<Principal>().is_none() {
        return Err(AppError::Unauthenticated);
    }
    Ok(next.run(req).await)
}

/// Route guard: principals without an account get 403.
pub async fn require_account(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Principal>() {
        None => Err(AppError::Unauthenticated),
        Some(p) if p.account.is_none() => Err(AppError::forbidden(
            "This action requires an account",
        )),
        Some(_) => Ok(next.run(req).await),
    }
}

/// Extractor for handlers behind the guards.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(AppError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::NoopSink;
    use crate::auth::PrincipalTokens;
    use crate::Config;
    use axum::{body::Body, middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use jwt_simple::prelude::Ed25519KeyPair;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(tokens: &PrincipalTokens) -> Router {
        let state = AppState::new(Arc::new(NoopSink), &Config::default_for_testing())
            .unwrap()
            .with_tokens(tokens.clone());

        Router::new()
            .route(
                "/me",
                get(|CurrentPrincipal(p): CurrentPrincipal| async move { p.user_id }),
            )
            .route_layer(middleware::from_fn(require_principal))
            .layer(middleware::from_fn_with_state(
                state,
                resolve_principal_middleware,
            ))
    }

    fn get_me(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/me");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_require_principal_rejects_anonymous() {
        let tokens = PrincipalTokens::from_key_pair(Ed25519KeyPair::generate());

        let response = app(&tokens).oneshot(get_me(None)).await.unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_valid_token_resolves_principal() {
        let tokens = PrincipalTokens::from_key_pair(Ed25519KeyPair::generate());
        let token = tokens.issue(&Principal::new("user-9")).unwrap();

        let response = app(&tokens).oneshot(get_me(Some(&token))).await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"user-9");
    }

    #[tokio::test]
    async fn test_token_from_other_key_is_ignored() {
        let tokens = PrincipalTokens::from_key_pair(Ed25519KeyPair::generate());
        let other = PrincipalTokens::from_key_pair(Ed25519KeyPair::generate());
        let token = other.issue(&Principal::new("intruder")).unwrap();

        let response = app(&tokens).oneshot(get_me(Some(&token))).await.unwrap();
        assert_eq!(response.status(), 401);
    }
}
