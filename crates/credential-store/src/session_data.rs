//! Persisted session data types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token set issued by the identity provider.
///
/// Replaced wholesale on login and refresh; never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Access token expiry (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Tokens {
    /// True when the access token has expired at `now` (unix seconds).
    /// Tokens without an expiry are treated as valid.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

/// Opaque claims bag describing the signed-in user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User {
    claims: Map<String, Value>,
}

impl User {
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Stable subject identifier (`sub` claim).
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(Value::as_str)
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Insert a claim only when it is not already present.
    pub fn insert_missing(&mut self, key: &str, value: Value) {
        self.claims.entry(key.to_string()).or_insert(value);
    }
}

/// Result of loading persisted credentials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSession {
    pub tokens: Option<Tokens>,
    pub user: Option<User>,
}

impl StoredSession {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.user.is_none()
    }

    /// Both halves present.
    pub fn is_complete(&self) -> bool {
        self.tokens.is_some() && self.user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokens_expiry() {
        let tokens = Tokens {
            access_token: "a".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: Some(1_000),
        };
        assert!(!tokens.is_expired(999));
        assert!(tokens.is_expired(1_000));
        assert!(tokens.is_expired(2_000));
    }

    #[test]
    fn test_tokens_without_expiry_never_expire() {
        let tokens = Tokens {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        assert!(!tokens.is_expired(i64::MAX));
    }

    #[test]
    fn test_user_claim_accessors() {
        let claims = json!({ "sub": "auth0|123", "email": "a@example.com", "name": "A" });
        let user: User = serde_json::from_value(claims).unwrap();

        assert_eq!(user.subject(), Some("auth0|123"));
        assert_eq!(user.email(), Some("a@example.com"));
        assert_eq!(user.claim("name"), Some(&json!("A")));
    }

    #[test]
    fn test_user_insert_missing_keeps_existing() {
        let mut user: User = serde_json::from_value(json!({ "email": "kept@example.com" })).unwrap();
        user.insert_missing("email", json!("other@example.com"));
        user.insert_missing("sub", json!("id-1"));

        assert_eq!(user.email(), Some("kept@example.com"));
        assert_eq!(user.subject(), Some("id-1"));
    }

    #[test]
    fn test_stored_session_completeness() {
        assert!(StoredSession::default().is_empty());

        let partial = StoredSession {
            tokens: None,
            user: Some(User::default()),
        };
        assert!(!partial.is_empty());
        assert!(!partial.is_complete());
    }
}
