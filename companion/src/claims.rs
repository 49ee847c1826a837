//! Identity token claims decoding.
//!
//! The id_token is split and its payload decoded without verifying the
//! signature. Signature trust sits with the backend that performed the code
//! exchange and minted the redirect; this module only checks structure.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CompanionError, CompanionResult};

/// Claims describing the authenticated user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub email: Option<String>,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    email: Option<String>,
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    exp: Option<i64>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Decode the claims of a `header.payload.signature` identity token.
pub fn decode_claims(id_token: &str) -> CompanionResult<IdentityClaims> {
    let segments: Vec<&str> = id_token.trim().split('.').collect();
    if segments.len() != 3 || segments.iter().take(2).any(|s| s.is_empty()) {
        return Err(CompanionError::malformed_token(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let header = decode_segment(segments[0], "header")?;
    if !header.is_object() {
        return Err(CompanionError::malformed_token("header is not a JSON object"));
    }

    let payload = decode_segment(segments[1], "payload")?;
    if !payload.is_object() {
        return Err(CompanionError::malformed_token("payload is not a JSON object"));
    }

    let raw: RawClaims = serde_json::from_value(payload)
        .map_err(|e| CompanionError::malformed_token(format!("payload claims: {}", e)))?;

    let subject = raw
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CompanionError::missing_claim("sub"))?;
    let exp = raw.exp.ok_or_else(|| CompanionError::missing_claim("exp"))?;
    let expires_at = DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| CompanionError::malformed_token(format!("exp {} is out of range", exp)))?;

    let audience = match raw.aud {
        Some(Audience::One(aud)) => vec![aud],
        Some(Audience::Many(auds)) => auds,
        None => Vec::new(),
    };

    Ok(IdentityClaims {
        subject,
        email: raw.email,
        issuer: raw.iss,
        audience,
        expires_at,
        name: raw.name,
    })
}

fn decode_segment(segment: &str, label: &str) -> CompanionResult<Value> {
    // Some issuers pad their segments even though base64url in JWTs should not
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| CompanionError::malformed_token(format!("{} is not base64url: {}", label, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CompanionError::malformed_token(format!("{} is not JSON: {}", label, e)))
}
