//! Principal model and token verification.

pub mod jwt;
pub mod principal;

pub use jwt::{PrincipalTokens, TokenError};
pub use principal::{derive_handle, Account, Principal, DEFAULT_HANDLE_DOMAIN};
