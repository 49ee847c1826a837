use chrono::{DateTime, Utc};
use tracing::info;

use crate::authorization::TokenSet;
use crate::claims::{decode_claims, IdentityClaims};
use crate::errors::CompanionResult;

/// The signed-in user for the lifetime of one redirect.
///
/// Write-once: there is no refresh, an expired session means going through
/// the authorization redirect again.
#[derive(Debug, Clone)]
pub struct TokenSession {
    tokens: TokenSet,
    claims: IdentityClaims,
}

impl TokenSession {
    pub fn new(tokens: TokenSet) -> CompanionResult<Self> {
        let claims = decode_claims(tokens.id_token())?;
        info!(
            "Session established for subject {} (expires {})",
            claims.subject, claims.expires_at
        );
        Ok(Self { tokens, claims })
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn access_token(&self) -> &str {
        self.tokens.access_token()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.claims.expires_at <= now
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.tokens.access_token())
    }
}
