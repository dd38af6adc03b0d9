//! Session credentials and their decoded claims.
//!
//! A credential is three dot-separated segments (header, payload,
//! signature). Only the payload is ever read; see [`validator`] for the
//! structural rules.

pub mod validator;

pub use validator::{is_valid_token, validate_structure};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::TokenError;
use validator::{EXPIRY, ISSUED_AT, SUBJECT, decode_payload, lookup_claim};

/// Claims read from a credential payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject the credential was issued to.
    pub subject: String,
    /// Unix timestamp (seconds) the credential was issued at.
    pub issued_at: i64,
    /// Unix timestamp (seconds) the credential expires at.
    pub expiry: i64,
}

impl TokenClaims {
    /// Seconds until expiry relative to `now`. Negative once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.expiry.saturating_sub(now.timestamp())
    }

    /// Whether fewer than `threshold_secs` remain before expiry.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        self.remaining_secs(now) < threshold_secs
    }
}

/// A structurally valid session credential.
///
/// Supplied by the session provider and relayed as-is; this crate never
/// mints or signs credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    raw: String,
    claims: TokenClaims,
}

impl SessionToken {
    /// Validate `raw` and decode its claims.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TokenError> {
        let raw = raw.into();
        let payload = decode_payload(&raw)?;

        let subject = match lookup_claim(&payload, SUBJECT) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(TokenError::MissingClaim(SUBJECT.0)),
        };
        let issued_at = timestamp_claim(&payload, ISSUED_AT)?;
        let expiry = timestamp_claim(&payload, EXPIRY)?;

        Ok(Self {
            raw,
            claims: TokenClaims {
                subject,
                issued_at,
                expiry,
            },
        })
    }

    /// The credential exactly as issued.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Shorthand for `claims().remaining_secs(now)`.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.claims.remaining_secs(now)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("subject", &self.claims.subject)
            .field("issued_at", &self.claims.issued_at)
            .field("expiry", &self.claims.expiry)
            .finish_non_exhaustive()
    }
}

/// Largest accepted timestamp claim (9999-12-31T23:59:59Z), in either direction.
const MAX_TIMESTAMP_SECS: i64 = 253_402_300_799;

fn timestamp_claim(
    payload: &serde_json::Map<String, Value>,
    claim: (&'static str, &'static str),
) -> Result<i64, TokenError> {
    let value = lookup_claim(payload, claim).ok_or(TokenError::MissingClaim(claim.0))?;
    let range = -MAX_TIMESTAMP_SECS..=MAX_TIMESTAMP_SECS;
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() <= MAX_TIMESTAMP_SECS as f64)
                .map(|f| f as i64)
        })
        .filter(|secs| range.contains(secs))
        .ok_or(TokenError::InvalidClaim(claim.0))
}
