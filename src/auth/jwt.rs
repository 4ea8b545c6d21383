//! Principal tokens signed with Ed25519.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::principal::{Account, Principal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalClaims {
    pub account_id: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid key encoding: {0}")]
    KeyEncoding(String),

    #[error("Invalid key: {0}")]
    Key(String),

    #[error("Signing key not available")]
    NoSigningKey,

    #[error("Token rejected: {0}")]
    Rejected(String),

    #[error("Token has no subject")]
    MissingSubject,
}

/// Verifies (and optionally issues) principal tokens.
#[derive(Clone)]
pub struct PrincipalTokens {
    key_pair: Option<Arc<Ed25519KeyPair>>,
    public_key: Arc<Ed25519PublicKey>,
    pub token_expiry_secs: u64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl PrincipalTokens {
    /// Verification-only tokens from a base64-encoded Ed25519 public key.
    pub fn from_public_key_b64(public_key_b64: &str) -> Result<Self, TokenError> {
        use base64::Engine;

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(public_key_b64.trim())
            .map_err(|e| TokenError::KeyEncoding(e.to_string()))?;

        let public_key =
            Ed25519PublicKey::from_bytes(&key_bytes).map_err(|e| TokenError::Key(e.to_string()))?;

        Ok(Self {
            key_pair: None,
            public_key: Arc::new(public_key),
            token_expiry_secs: 3600,
            issuer: None,
            audience: None,
        })
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Some(Arc::new(key_pair)),
            public_key: Arc::new(public_key),
            token_expiry_secs: 3600,
            issuer: None,
            audience: None,
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        let private_b64 = base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes());
        let public_b64 =
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes());
        (private_b64, public_b64)
    }

    pub fn can_issue(&self) -> bool {
        self.key_pair.is_some()
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, TokenError> {
        let key_pair = self.key_pair.as_ref().ok_or(TokenError::NoSigningKey)?;

        let custom = PrincipalClaims {
            account_id: principal.account.as_ref().map(|a| a.id.clone()),
            username: principal.username().map(str::to_string),
            domain: principal.domain().map(str::to_string),
        };

        let mut claims =
            Claims::with_custom_claims(custom, Duration::from_secs(self.token_expiry_secs))
                .with_subject(principal.user_id.clone());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }

        key_pair
            .sign(claims)
            .map_err(|e| TokenError::Rejected(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(HashSet::from([audience.clone()]));
        }

        let token_data = self
            .public_key
            .verify_token::<PrincipalClaims>(token, Some(options))
            .map_err(|e| TokenError::Rejected(e.to_string()))?;

        let user_id = token_data
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingSubject)?;

        let custom = token_data.custom;
        let account = custom.account_id.map(|id| Account {
            id,
            username: custom.username,
            domain: custom.domain,
        });

        Ok(Principal { user_id, account })
    }
}

impl std::fmt::Debug for PrincipalTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalTokens")
            .field("can_issue", &self.can_issue())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tokens() -> PrincipalTokens {
        PrincipalTokens::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let tokens = test_tokens();
        let principal = Principal::new("42").with_account("7", Some("alice"), Some("example.org"));

        let token = tokens.issue(&principal).expect("Token issue should succeed");
        let verified = tokens.verify(&token).expect("Token should verify");

        assert_eq!(verified, principal);
    }

    #[test]
    fn test_principal_without_account() {
        let tokens = test_tokens();
        let token = tokens.issue(&Principal::new("42")).unwrap();
        let verified = tokens.verify(&token).unwrap();
        assert_eq!(verified.user_id, "42");
        assert!(verified.account.is_none());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = test_tokens();
        let verifier = test_tokens();
        let token = issuer.issue(&Principal::new("1")).unwrap();
        assert!(matches!(verifier.verify(&token), Err(TokenError::Rejected(_))));
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let key_pair = Ed25519KeyPair::generate();
        let public_b64 = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes())
        };
        let issuer = PrincipalTokens::from_key_pair(key_pair).with_issuer(Some("other".into()));
        let verifier = PrincipalTokens::from_public_key_b64(&public_b64)
            .unwrap()
            .with_issuer(Some("beacon".into()));

        let token = issuer.issue(&Principal::new("1")).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_verify_only_cannot_issue() {
        let (_, public_b64) = PrincipalTokens::generate_key_pair();
        let tokens = PrincipalTokens::from_public_key_b64(&public_b64).unwrap();
        assert!(!tokens.can_issue());
        assert!(matches!(
            tokens.issue(&Principal::new("1")),
            Err(TokenError::NoSigningKey)
        ));
    }

    #[test]
    fn test_bad_public_key() {
        assert!(matches!(
            PrincipalTokens::from_public_key_b64("not base64!"),
            Err(TokenError::KeyEncoding(_))
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let tokens = test_tokens();
        assert!(tokens.verify("invalid.token.here").is_err());
    }
}
