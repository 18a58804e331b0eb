//! Best-effort expiry peeking for JWT access tokens
//!
//! The signature is never checked. The result only decides when to refresh
//! proactively and must not be used for authorization.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

/// Read the `exp` claim (seconds since epoch) from a compact JWT
///
/// Returns `None` when the expiry is unknown: fewer than two segments,
/// undecodable payload, non-JSON payload, or a missing, zero or negative
/// `exp`.
pub fn decode_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    if payload.is_empty() {
        return None;
    }

    // Accept the standard alphabet and padding as well as base64url
    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let exp = match claims.get("exp")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64)?,
        _ => return None,
    };

    (exp > 0).then_some(exp)
}

/// Whether a token should be refreshed before use
///
/// Unknown expiry never triggers a refresh.
pub fn needs_refresh(token: &str, now: i64, margin_secs: i64) -> bool {
    match decode_expiry(token) {
        None => false,
        Some(exp) => exp - now <= margin_secs,
    }
}

/// Build an unsigned token with the given claims
#[cfg(test)]
pub(crate) fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
