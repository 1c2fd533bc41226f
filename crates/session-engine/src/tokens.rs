//! Conversion from identity-provider token responses to [`Tokens`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use credential_store::Tokens;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw profile claims returned by the identity provider.
pub type RawUser = Map<String, Value>;

/// Token endpoint response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Build a [`Tokens`] value from a token response received at `now` (unix seconds).
///
/// Expiry comes from `expires_in`, else from the access token's `exp` claim.
/// When the response carries no refresh token, `previous_refresh_token` is kept.
pub fn tokens_from_raw(raw: RawTokens, now: i64, previous_refresh_token: Option<&str>) -> Tokens {
    let expires_at = match raw.expires_in {
        Some(expires_in) => Some(now.saturating_add(expires_in)),
        None => jwt_expiry(&raw.access_token),
    };

    Tokens {
        refresh_token: raw
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string)),
        access_token: raw.access_token,
        token_type: raw.token_type,
        expires_at,
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_jwt_claims(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return None,
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}

fn jwt_expiry(token: &str) -> Option<i64> {
    decode_jwt_claims(token)?.get("exp").and_then(Value::as_i64)
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(access_token: &str) -> RawTokens {
        RawTokens {
            access_token: access_token.to_string(),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in: None,
        }
    }

    #[test]
    fn test_expires_in_wins() {
        let mut response = raw(&fake_jwt(json!({ "exp": 5 })));
        response.expires_in = Some(600);

        let tokens = tokens_from_raw(response, 1_000, None);
        assert_eq!(tokens.expires_at, Some(1_600));
    }

    #[test]
    fn test_expiry_from_jwt_exp_claim() {
        let tokens = tokens_from_raw(raw(&fake_jwt(json!({ "exp": 1_700_000_000 }))), 0, None);
        assert_eq!(tokens.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn test_opaque_token_without_expiry() {
        let tokens = tokens_from_raw(raw("opaque-token"), 0, None);
        assert_eq!(tokens.expires_at, None);
    }

    #[test]
    fn test_keeps_previous_refresh_token_when_not_rotated() {
        let tokens = tokens_from_raw(raw("a"), 0, Some("rt-1"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));

        let mut rotated = raw("a");
        rotated.refresh_token = Some("rt-2".to_string());
        let tokens = tokens_from_raw(rotated, 0, Some("rt-1"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-2"));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode_jwt_claims("only.two").is_none());
        assert!(decode_jwt_claims("a.!!!.c").is_none());
        let not_object = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(decode_jwt_claims(&not_object).is_none());
    }

    #[test]
    fn test_token_response_defaults() {
        let parsed: RawTokens = serde_json::from_value(json!({
            "access_token": "a",
            "expires_in": 86400
        }))
        .unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.expires_in, Some(86400));
    }
}
