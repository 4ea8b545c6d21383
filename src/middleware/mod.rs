//! Request middleware.

pub mod auth;
pub mod rate_limit;
pub mod telemetry;

pub use auth::{require_account, require_principal, resolve_principal_middleware, CurrentPrincipal};
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitState};
pub use telemetry::request_telemetry_middleware;
