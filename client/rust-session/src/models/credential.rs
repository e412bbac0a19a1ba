use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minimal identity reference kept next to the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub uid: String,
    pub email: String,
}

/// The authenticated session: bearer token plus who it belongs to.
///
/// Always stored and replaced as one value, never field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub user: UserRef,
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issued_at", &self.issued_at)
            .field("user", &self.user)
            .finish()
    }
}

impl Credential {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }

    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) >= max_age
    }
}

#[derive(Deserialize)]
struct IssuedAtClaim {
    iat: Option<i64>,
}

/// Reads the `iat` claim from a JWT-shaped token without verifying it.
/// Signature verification is the backend's job; the client only needs the
/// issue time to decide when to refresh.
pub fn token_issued_at(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: IssuedAtClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.iat?, 0)
}
