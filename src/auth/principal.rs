//! Authenticated principal and handle derivation.

use serde::{Deserialize, Serialize};

/// Domain used for handles of accounts that carry no domain of their own.
pub const DEFAULT_HANDLE_DOMAIN: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: Option<String>,
    pub domain: Option<String>,
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub account: Option<Account>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            account: None,
        }
    }

    pub fn with_account(
        mut self,
        account_id: impl Into<String>,
        username: Option<&str>,
        domain: Option<&str>,
    ) -> Self {
        self.account = Some(Account {
            id: account_id.into(),
            username: username.map(str::to_string),
            domain: domain.map(str::to_string),
        });
        self
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.id.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.account.as_ref().and_then(|a| a.username.as_deref())
    }

    pub fn domain(&self) -> Option<&str> {
        self.account.as_ref().and_then(|a| a.domain.as_deref())
    }

    /// `username@domain`, falling back to `default_domain` when the account
    /// has none. `None` when there is no username.
    pub fn handle(&self, default_domain: &str) -> Option<String> {
        let username = self.username().filter(|u| !u.is_empty())?;
        let domain = self
            .domain()
            .filter(|d| !d.is_empty())
            .unwrap_or(default_domain);
        Some(format!("{}@{}", username, domain))
    }
}

/// Handle for an optional principal.
pub fn derive_handle(principal: Option<&Principal>, default_domain: &str) -> Option<String> {
    principal.and_then(|p| p.handle(default_domain))
}
