//! Structural checks on the bearer token.
//!
//! Nothing here verifies a signature; the backend does that during
//! introspection. The offline checks only weed out garbage before a network
//! round trip is spent on it.

use base64ct::{Base64, Base64Unpadded, Base64Url, Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("empty token")]
    Empty,
    #[error("invalid token structure")]
    Structure,
    #[error("invalid base64 encoding")]
    Base64,
    #[error("invalid token header")]
    Header,
    #[error("invalid token payload")]
    Payload,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    #[serde(default)]
    pub alg: String,
    #[serde(default)]
    pub typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// JWT segments are base64url, but older issuers used plain base64.
fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    Base64UrlUnpadded::decode_vec(segment)
        .or_else(|_| Base64Url::decode_vec(segment))
        .or_else(|_| Base64Unpadded::decode_vec(segment))
        .or_else(|_| Base64::decode_vec(segment))
        .map_err(|_| TokenError::Base64)
}

fn decode_json<T: for<'de> Deserialize<'de>>(
    segment: &str,
    on_invalid: TokenError,
) -> Result<T, TokenError> {
    let bytes = decode_segment(segment)?;
    serde_json::from_slice(&bytes).map_err(|_| on_invalid)
}

/// Decodes header and claims and checks the minimum fields and expiry.
///
/// # Errors
/// Returns the first structural problem found.
pub fn decode_at(token: &str, now_unix_seconds: i64) -> Result<TokenClaims, TokenError> {
    if token.trim().is_empty() {
        return Err(TokenError::Empty);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
        return Err(TokenError::Structure);
    }

    let header: TokenHeader = decode_json(parts[0], TokenError::Header)?;
    if header.alg.is_empty() || header.typ.is_empty() {
        return Err(TokenError::Header);
    }

    let claims: TokenClaims = decode_json(parts[1], TokenError::Payload)?;
    if claims.sub.trim().is_empty() || claims.exp == 0 || claims.iat == 0 {
        return Err(TokenError::Payload);
    }

    if claims.exp <= now_unix_seconds {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// # Errors
/// See [`decode_at`].
pub fn decode(token: &str) -> Result<TokenClaims, TokenError> {
    decode_at(token, now_unix_seconds())
}

#[must_use]
pub fn is_structurally_valid_at(token: &str, now_unix_seconds: i64) -> bool {
    match decode_at(token, now_unix_seconds) {
        Ok(_) => true,
        Err(err) => {
            warn!("security: token rejected: {err}");
            false
        }
    }
}

#[must_use]
pub fn is_structurally_valid(token: &str) -> bool {
    is_structurally_valid_at(token, now_unix_seconds())
}
