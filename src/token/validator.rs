//! Structural credential checks.
//!
//! This is a sanity check on the shape of a credential, not a trust
//! decision: signatures are never verified. The session provider is the
//! authority on whether a credential is genuine.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};

use crate::error::TokenError;

/// base64url decoder that accepts payloads with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims every payload must carry, as `(wire name, long-form alias)`.
pub(crate) const SUBJECT: (&str, &str) = ("sub", "subject");
pub(crate) const ISSUED_AT: (&str, &str) = ("iat", "issuedAt");
pub(crate) const EXPIRY: (&str, &str) = ("exp", "expiry");

const REQUIRED_CLAIMS: [(&str, &str); 3] = [SUBJECT, ISSUED_AT, EXPIRY];

/// Returns `true` when `candidate` has the shape of a session credential.
///
/// False when the input is absent, does not split into exactly three
/// non-empty dot-separated segments, has a payload that is not base64url
/// encoded JSON object data, or lacks any of the subject, issued-at and
/// expiry claims.
pub fn is_valid_token(candidate: Option<&str>) -> bool {
    validate_structure(candidate).is_ok()
}

/// Like [`is_valid_token`] but reports which check failed.
pub fn validate_structure(candidate: Option<&str>) -> Result<(), TokenError> {
    let token = candidate.ok_or(TokenError::Absent)?;
    let payload = decode_payload(token)?;
    for claim in REQUIRED_CLAIMS {
        if lookup_claim(&payload, claim).is_none() {
            return Err(TokenError::MissingClaim(claim.0));
        }
    }
    Ok(())
}

/// Split a credential and decode its middle segment into a JSON object.
pub(crate) fn decode_payload(token: &str) -> Result<Map<String, Value>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::Segments(
            segments.iter().filter(|s| !s.is_empty()).count(),
        ));
    }

    let bytes = URL_SAFE_LENIENT
        .decode(segments[1])
        .map_err(|e| TokenError::Encoding(e.to_string()))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TokenError::Payload(format!("found {}", json_kind(&other)))),
        Err(e) => Err(TokenError::Payload(e.to_string())),
    }
}

/// Find a claim by its wire name, falling back to the long-form alias.
/// JSON `null` counts as absent.
pub(crate) fn lookup_claim<'a>(
    payload: &'a Map<String, Value>,
    (name, alias): (&str, &str),
) -> Option<&'a Value> {
    payload
        .get(name)
        .or_else(|| payload.get(alias))
        .filter(|v| !v.is_null())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
