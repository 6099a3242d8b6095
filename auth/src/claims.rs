//! Bearer token claims.
//!
//! Tokens are three dot-separated segments; only the middle one is read.
//! Signatures are never checked here: the server is the trust boundary, the
//! client only needs to know who the token names and when it stops being
//! useful.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    /// Token did not have exactly three segments.
    #[error("expected 3 token segments, found {0}")]
    SegmentCount(usize),

    /// Payload segment is not valid base64url.
    #[error("payload is not valid base64url")]
    Base64,

    /// Payload is not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    Json(String),

    /// No `sub` claim.
    #[error("missing subject claim")]
    MissingSubject,

    /// No usable `exp` claim.
    #[error("missing expiry claim")]
    MissingExpiry,
}

/// Identity claims read from a bearer token.
///
/// Derived on every read and never persisted apart from the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// `sub`, the username the token was issued for.
    pub subject: String,
    /// Numeric account id, when one could be resolved.
    pub numeric_id: Option<i64>,
    /// `role`, as issued (may carry a `ROLE_` prefix).
    pub role: Option<String>,
    /// `exp`, seconds since the Unix epoch.
    pub expiry_epoch_seconds: i64,
}

impl Claims {
    /// Whether the token is no longer valid at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_epoch_seconds <= now.timestamp()
    }
}

/// Decode the claims of a bearer token.
///
/// The numeric id is resolved from `id`, then `userId`, then a numeric
/// `sub`. Unknown fields are ignored.
///
/// # Errors
///
/// Returns a [`ClaimsError`] for a wrong segment count, an undecodable or
/// non-object payload, or a missing `sub`/`exp`.
///
/// # Examples
///
/// ```
/// use bookclub_auth::claims::{decode, ClaimsError};
///
/// assert_eq!(decode("not-a-token"), Err(ClaimsError::SegmentCount(1)));
/// ```
pub fn decode(token: &str) -> Result<Claims, ClaimsError> {
    let payload = decode_payload(token)?;

    let subject = match payload.get("sub") {
        Some(Value::String(sub)) => sub.clone(),
        Some(Value::Number(sub)) => sub.to_string(),
        _ => return Err(ClaimsError::MissingSubject),
    };

    let expiry_epoch_seconds = payload
        .get("exp")
        .and_then(as_integer)
        .ok_or(ClaimsError::MissingExpiry)?;

    let numeric_id = payload
        .get("id")
        .and_then(as_integer)
        .or_else(|| payload.get("userId").and_then(as_integer))
        .or_else(|| subject.trim().parse().ok());

    let role = payload
        .get("role")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Claims {
        subject,
        numeric_id,
        role,
        expiry_epoch_seconds,
    })
}

/// Decode a token's payload without interpreting it.
///
/// Pending registration tokens carry prefill hints (`sub`, `name`,
/// `provider`) that are not identity claims.
///
/// # Errors
///
/// Returns a [`ClaimsError`] if the token is not three segments or the
/// payload is not a base64url JSON object.
pub fn decode_payload(token: &str) -> Result<Map<String, Value>, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::SegmentCount(segments.len()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| ClaimsError::Base64)?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ClaimsError::Json(format!("found {other}"))),
        Err(e) => Err(ClaimsError::Json(e.to_string())),
    }
}

#[allow(clippy::cast_possible_truncation)] // exp/id beyond i64 are not real tokens
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn reads_subject_role_and_expiry() {
        let claims = decode(&token(&json!({
            "sub": "reader",
            "role": "ROLE_ADMIN",
            "exp": 1_900_000_000
        })))
        .unwrap();

        assert_eq!(claims.subject, "reader");
        assert_eq!(claims.role.as_deref(), Some("ROLE_ADMIN"));
        assert_eq!(claims.expiry_epoch_seconds, 1_900_000_000);
        assert_eq!(claims.numeric_id, None);
    }

    #[test]
    fn numeric_id_prefers_id_then_user_id_then_subject() {
        let all = json!({"sub": "7", "id": 1, "userId": 2, "exp": 1});
        assert_eq!(decode(&token(&all)).unwrap().numeric_id, Some(1));

        let user_id = json!({"sub": "7", "userId": "2", "exp": 1});
        assert_eq!(decode(&token(&user_id)).unwrap().numeric_id, Some(2));

        let subject = json!({"sub": "7", "exp": 1});
        assert_eq!(decode(&token(&subject)).unwrap().numeric_id, Some(7));
    }

    #[test]
    fn padded_payload_is_accepted() {
        let body = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"a","exp":5}"#);
        let claims = decode(&format!("h.{body}.s")).unwrap();
        assert_eq!(claims.subject, "a");
    }

    #[test]
    fn malformed_tokens_are_errors() {
        assert_eq!(decode("a.b"), Err(ClaimsError::SegmentCount(2)));
        assert_eq!(decode("a.!!!.c"), Err(ClaimsError::Base64));

        let not_json = URL_SAFE_NO_PAD.encode("plain text");
        assert!(matches!(
            decode(&format!("a.{not_json}.c")),
            Err(ClaimsError::Json(_))
        ));

        let array = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(matches!(
            decode(&format!("a.{array}.c")),
            Err(ClaimsError::Json(_))
        ));
    }

    #[test]
    fn missing_subject_or_expiry_is_rejected() {
        assert_eq!(
            decode(&token(&json!({"exp": 1}))),
            Err(ClaimsError::MissingSubject)
        );
        assert_eq!(
            decode(&token(&json!({"sub": "a"}))),
            Err(ClaimsError::MissingExpiry)
        );
    }

    #[test]
    fn expiry_is_judged_against_the_given_instant() {
        let claims = decode(&token(&json!({"sub": "a", "exp": 100}))).unwrap();
        assert!(!claims.is_expired(DateTime::from_timestamp(99, 0).unwrap()));
        assert!(claims.is_expired(DateTime::from_timestamp(100, 0).unwrap()));
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in ".*") {
            let _ = decode(&input);
        }

        #[test]
        fn any_subject_round_trips(sub in "[a-zA-Z0-9_]{1,24}", exp in 0i64..4_000_000_000) {
            let claims = decode(&token(&json!({"sub": sub, "exp": exp}))).unwrap();
            prop_assert_eq!(claims.subject, sub);
            prop_assert_eq!(claims.expiry_epoch_seconds, exp);
        }
    }
}
