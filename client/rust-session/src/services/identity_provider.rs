use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::IdentitySettings;

/// Tokens and identity issued by the provider for one sign-in or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub uid: String,
    /// Absent on refresh responses.
    pub email: Option<String>,
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered and refused; `code` is its raw error code.
    #[error("identity provider rejected the request: {code}")]
    Rejected { code: String },
    /// No usable answer (connection refused, timeout, DNS).
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    #[error("unexpected identity provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::MalformedResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Email/password identity provider the gateway signs users in with.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError>;

    /// Remote half of sign-out. Token-based providers have nothing to do.
    async fn sign_out(&self, _id_token: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    id_token: String,
    refresh_token: Option<String>,
    local_id: String,
    email: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: Option<String>,
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Identity-toolkit style REST provider (`accounts:signUp`,
/// `accounts:signInWithPassword`, refresh-token exchange).
#[derive(Clone, Debug)]
pub struct RestIdentityProvider {
    http_client: Client,
    base_url: Url,
    token_url: Url,
    api_key: String,
}

impl RestIdentityProvider {
    pub fn new(settings: &IdentitySettings) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(http_client: Client, settings: &IdentitySettings) -> anyhow::Result<Self> {
        let base_url = parse_base(&settings.base_url).context("Invalid identity provider URL")?;
        let token_url = Url::parse(&settings.token_url).context("Invalid identity token URL")?;
        Ok(Self {
            http_client,
            base_url,
            token_url,
            api_key: settings.api_key.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> Result<Url, ProviderError> {
        // `accounts:signUp` on its own would parse as a URL with scheme `accounts`.
        self.base_url
            .join(&format!("./{}", action))
            .map_err(|e| ProviderError::MalformedResponse(format!("bad endpoint {}: {}", action, e)))
    }

    async fn password_call(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError> {
        let response = self
            .http_client
            .post(self.endpoint(action)?)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let body: PasswordResponse = read_json(response).await?;
        Ok(ProviderSession {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            uid: body.local_id,
            email: body.email,
        })
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        self.password_call("accounts:signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        self.password_call("accounts:signInWithPassword", email, password)
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        let response = self
            .http_client
            .post(self.token_url.clone())
            .query(&[("key", self.api_key.as_str())])
            .json(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await?;

        let body: RefreshResponse = read_json(response).await?;
        Ok(ProviderSession {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            uid: body.user_id,
            email: None,
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()));
    }

    match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
        Ok(envelope) => Err(ProviderError::Rejected {
            code: envelope.error.message,
        }),
        Err(_) if status.is_server_error() => {
            Err(ProviderError::Transport(format!("provider returned {}", status)))
        }
        Err(_) => Err(ProviderError::MalformedResponse(format!(
            "provider returned {} without an error code",
            status
        ))),
    }
}

/// `Url::join` drops the last path segment unless it ends with a slash.
fn parse_base(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{}/", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> IdentitySettings {
        IdentitySettings {
            base_url: base_url.into(),
            token_url: "https://securetoken.example.test/v1/token".into(),
            api_key: "key".into(),
        }
    }

    #[test]
    fn endpoints_keep_the_version_segment() {
        let provider = RestIdentityProvider::new(&settings("https://id.example.test/v1")).unwrap();
        assert_eq!(
            provider.endpoint("accounts:signUp").unwrap().as_str(),
            "https://id.example.test/v1/accounts:signUp"
        );
    }

    #[test]
    fn malformed_settings_are_rejected() {
        assert!(RestIdentityProvider::new(&settings("not a url")).is_err());
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(!ProviderError::Rejected {
            code: "TOKEN_EXPIRED".into()
        }
        .is_transient());
    }
}
