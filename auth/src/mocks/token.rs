//! Unsigned bearer tokens for tests.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

/// Mint a three-segment token with the given claims.
///
/// The signature segment is a placeholder; the client never verifies it.
#[must_use]
pub fn mint_token(subject: &str, id: Option<i64>, role: Option<&str>, expires_at: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "typ": "JWT"}).to_string());

    let mut claims = json!({"sub": subject, "exp": expires_at});
    if let Some(id) = id {
        claims["id"] = json!(id);
    }
    if let Some(role) = role {
        claims["role"] = json!(role);
    }
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

    format!("{header}.{payload}.signature")
}
