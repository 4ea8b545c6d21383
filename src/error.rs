//! Error-status mapping for request failures.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Failure category attached to error responses.
///
/// Error responses carry their kind in the response extensions so outer
/// middleware can tell a handler-produced 404 from a plain one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    NotAcceptable,
    InvalidAuthenticityToken,
    RateLimitExceeded,
    UpstreamNetwork,
    UpstreamStorage,
    Overloaded,
    Unexpected,
    Panic,
    ClientDisconnected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotAcceptable => "not_acceptable",
            ErrorKind::InvalidAuthenticityToken => "invalid_authenticity_token",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::UpstreamNetwork => "upstream_network",
            ErrorKind::UpstreamStorage => "upstream_storage",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::Unexpected => "unexpected",
            ErrorKind::Panic => "panic",
            ErrorKind::ClientDisconnected => "client_disconnected",
        }
    }

    /// Status from the fixed mapping table, `None` for unmapped failures.
    pub fn mapped_status(&self) -> Option<StatusCode> {
        match self {
            ErrorKind::BadRequest => Some(StatusCode::BAD_REQUEST),
            ErrorKind::Unauthenticated => Some(StatusCode::UNAUTHORIZED),
            ErrorKind::Forbidden => Some(StatusCode::FORBIDDEN),
            ErrorKind::NotFound => Some(StatusCode::NOT_FOUND),
            ErrorKind::NotAcceptable => Some(StatusCode::NOT_ACCEPTABLE),
            ErrorKind::InvalidAuthenticityToken => Some(StatusCode::UNPROCESSABLE_ENTITY),
            ErrorKind::RateLimitExceeded => Some(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::UpstreamNetwork => Some(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::UpstreamStorage | ErrorKind::Overloaded => {
                Some(StatusCode::SERVICE_UNAVAILABLE)
            }
            ErrorKind::Unexpected | ErrorKind::Panic | ErrorKind::ClientDisconnected => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unsupported response format: {0}")]
    NotAcceptable(String),

    #[error("Invalid authenticity token")]
    InvalidAuthenticityToken,

    #[error("Too many requests")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Upstream network error: {0}")]
    UpstreamNetwork(String),

    #[error("Upstream storage error: {0}")]
    UpstreamStorage(String),

    #[error("Service temporarily unavailable")]
    Overloaded,

    #[error(transparent)]
    Unexpected(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::NotAcceptable(_) => ErrorKind::NotAcceptable,
            AppError::InvalidAuthenticityToken => ErrorKind::InvalidAuthenticityToken,
            AppError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AppError::UpstreamNetwork(_) => ErrorKind::UpstreamNetwork,
            AppError::UpstreamStorage(_) => ErrorKind::UpstreamStorage,
            AppError::Overloaded => ErrorKind::Overloaded,
            AppError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Status the response carries. Unmapped failures fall back to 500.
    pub fn status(&self) -> StatusCode {
        self.kind()
            .mapped_status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn unexpected(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        AppError::Unexpected(err.into())
    }

    fn code(&self) -> String {
        self.kind().as_str().to_uppercase()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = self.status();

        let body = match &self {
            AppError::Unexpected(e) => {
                error!(error = %e, "Unhandled request error");
                ApiError::new("Internal server error", "INTERNAL_ERROR")
            }
            other => ApiError::new(other.to_string(), other.code()),
        };

        let mut response = (status, Json(body)).into_response();

        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response.extensions_mut().insert(kind);
        response
    }
}

pub type ApiResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_table() {
        let cases = [
            (AppError::bad_request("missing param"), 400),
            (AppError::Unauthenticated, 401),
            (AppError::forbidden("nope"), 403),
            (AppError::not_found("gone"), 404),
            (AppError::NotAcceptable("text/csv".to_string()), 406),
            (AppError::InvalidAuthenticityToken, 422),
            (AppError::RateLimitExceeded { retry_after_secs: 3 }, 429),
            (AppError::UpstreamNetwork("tls".to_string()), 500),
            (AppError::UpstreamStorage("s3".to_string()), 503),
            (AppError::Overloaded, 503),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status().as_u16(), expected, "{:?}", err);
            assert!(err.kind().mapped_status().is_some());
        }
    }

    #[test]
    fn test_unexpected_is_unmapped() {
        let err = AppError::unexpected("boom");
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(err.kind().mapped_status().is_none());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_response_carries_kind() {
        let response = AppError::not_found("Record not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.extensions().get::<ErrorKind>(),
            Some(&ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = AppError::RateLimitExceeded {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::ClientDisconnected), "client_disconnected");
        assert_eq!(ErrorKind::InvalidAuthenticityToken.as_str(), "invalid_authenticity_token");
    }
}
