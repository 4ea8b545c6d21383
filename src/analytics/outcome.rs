//! Final status of a handled request.

use axum::{http::StatusCode, response::Response};

use crate::error::{AppError, ErrorKind};

/// Non-standard status reported when the client went away before a
/// response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub status_code: u16,
    pub error_kind: Option<ErrorKind>,
}

impl ResponseOutcome {
    pub fn new(status: StatusCode, error_kind: Option<ErrorKind>) -> Self {
        Self {
            status_code: status.as_u16(),
            error_kind,
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        Self::new(err.status(), Some(err.kind()))
    }

    pub fn panicked() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, Some(ErrorKind::Panic))
    }

    pub fn client_disconnected() -> Self {
        Self {
            status_code: CLIENT_CLOSED_REQUEST,
            error_kind: Some(ErrorKind::ClientDisconnected),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_kind.is_some() || self.status_code >= 500
    }
}

/// Values a wrapped delegate can produce that carry a reportable outcome.
pub trait ReportOutcome {
    fn outcome(&self) -> ResponseOutcome;
}

impl ReportOutcome for Response {
    fn outcome(&self) -> ResponseOutcome {
        ResponseOutcome::new(self.status(), self.extensions().get::<ErrorKind>().copied())
    }
}

impl ReportOutcome for StatusCode {
    fn outcome(&self) -> ResponseOutcome {
        ResponseOutcome::new(*self, None)
    }
}

impl<T: ReportOutcome> ReportOutcome for Result<T, AppError> {
    fn outcome(&self) -> ResponseOutcome {
        match self {
            Ok(value) => value.outcome(),
            Err(err) => ResponseOutcome::from_error(err),
        }
    }
}
