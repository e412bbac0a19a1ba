use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use validator::Validate;

use super::api_client::{SessionToken, TokenSource};
use super::credential_store::CredentialStore;
use super::identity_provider::{IdentityProvider, ProviderError, ProviderSession};
use crate::config::SessionSettings;
use crate::metrics::record_auth_event;
use crate::models::credential::{token_issued_at, Credential, UserRef};
use crate::utils::retry::{retry_transient, RetryPolicy};

/// Closed set of sign-in/sign-up failures. Every provider code lands on
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    MissingPassword,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    UserDisabled,
    TooManyRequests,
    NetworkRequestFailed,
    OperationNotAllowed,
    SessionExpired,
    Unknown,
}

impl AuthErrorCode {
    /// Accepts SDK codes (`auth/email-already-in-use`) and REST codes
    /// (`EMAIL_EXISTS`, `INVALID_PASSWORD : detail`).
    pub fn from_provider_code(raw: &str) -> Self {
        let head = raw
            .trim()
            .split(|c: char| c == ' ' || c == ':')
            .next()
            .unwrap_or_default();
        let head = head.strip_prefix("auth/").unwrap_or(head);
        let normalized = head.to_ascii_lowercase().replace('_', "-");

        match normalized.as_str() {
            "email-already-in-use" | "email-exists" => Self::EmailAlreadyInUse,
            "invalid-email" => Self::InvalidEmail,
            "weak-password" => Self::WeakPassword,
            "missing-password" => Self::MissingPassword,
            "user-not-found" | "email-not-found" => Self::UserNotFound,
            "wrong-password" | "invalid-password" => Self::WrongPassword,
            "invalid-credential" | "invalid-login-credentials" => Self::InvalidCredential,
            "user-disabled" => Self::UserDisabled,
            "too-many-requests" | "too-many-attempts-try-later" => Self::TooManyRequests,
            "network-request-failed" => Self::NetworkRequestFailed,
            "operation-not-allowed" | "password-login-disabled" => Self::OperationNotAllowed,
            "user-token-expired" | "token-expired" | "invalid-refresh-token"
            | "invalid-grant-type" => Self::SessionExpired,
            _ => Self::Unknown,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::EmailAlreadyInUse => "An account with this email already exists.",
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::WeakPassword => "Password must be at least 6 characters.",
            Self::MissingPassword => "Please enter your password.",
            Self::UserNotFound => "No account found with this email.",
            Self::WrongPassword => "Incorrect password. Please try again.",
            Self::InvalidCredential => "Invalid email or password.",
            Self::UserDisabled => "This account has been disabled.",
            Self::TooManyRequests => "Too many attempts. Please try again later.",
            Self::NetworkRequestFailed => "Network error. Please check your connection and try again.",
            Self::OperationNotAllowed => "Email and password sign-in is not enabled.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::Unknown => "Authentication failed. Please try again.",
        }
    }
}

/// A sign-in/sign-up failure carrying only the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .code.message())]
pub struct AuthError {
    pub code: AuthErrorCode,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        self.code.message()
    }
}

impl From<AuthErrorCode> for AuthError {
    fn from(code: AuthErrorCode) -> Self {
        Self { code }
    }
}

impl From<ProviderError> for AuthError {
    fn from(e: ProviderError) -> Self {
        let code = match &e {
            ProviderError::Rejected { code } => AuthErrorCode::from_provider_code(code),
            ProviderError::Transport(_) => AuthErrorCode::NetworkRequestFailed,
            ProviderError::MalformedResponse(_) => AuthErrorCode::Unknown,
        };
        Self { code }
    }
}

#[derive(Debug, Validate)]
struct CredentialsForm {
    #[validate(email)]
    email: String,
    #[validate(length(min = 6))]
    password: String,
}

impl CredentialsForm {
    fn check(email: &str, password: &str) -> Result<Self, AuthError> {
        let form = Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        if form.email.is_empty() {
            return Err(AuthErrorCode::InvalidEmail.into());
        }
        if form.password.is_empty() {
            return Err(AuthErrorCode::MissingPassword.into());
        }
        if let Err(errors) = form.validate() {
            let fields = errors.field_errors();
            let code = if fields.contains_key("email") {
                AuthErrorCode::InvalidEmail
            } else {
                AuthErrorCode::WeakPassword
            };
            return Err(code.into());
        }
        Ok(form)
    }
}

/// Wraps the identity provider and owns every write of a new session into
/// the credential store.
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<CredentialStore>,
    refresh_after: chrono::Duration,
    retry: RetryPolicy,
    /// Held for the whole refresh exchange so concurrent callers share one.
    refreshing: AsyncMutex<()>,
}

impl AuthGateway {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<CredentialStore>,
        settings: &SessionSettings,
    ) -> Self {
        let refresh_after = chrono::Duration::from_std(settings.token_refresh_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(55));
        Self {
            provider,
            store,
            refresh_after,
            retry: RetryPolicy::default(),
            refreshing: AsyncMutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let form = CredentialsForm::check(email, password).inspect_err(|e| {
            record_auth_event("sign_up", "invalid");
            tracing::debug!("Sign-up rejected locally: {:?}", e.code);
        })?;

        match self.provider.sign_up(&form.email, &form.password).await {
            Ok(session) => {
                record_auth_event("sign_up", "ok");
                Ok(self.establish(session, &form.email))
            }
            Err(e) => {
                record_auth_event("sign_up", "error");
                tracing::warn!("Sign-up failed: {}", e);
                Err(e.into())
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        let form = CredentialsForm::check(email, password).inspect_err(|e| {
            record_auth_event("sign_in", "invalid");
            tracing::debug!("Sign-in rejected locally: {:?}", e.code);
        })?;

        match self.provider.sign_in(&form.email, &form.password).await {
            Ok(session) => {
                record_auth_event("sign_in", "ok");
                Ok(self.establish(session, &form.email))
            }
            Err(e) => {
                record_auth_event("sign_in", "error");
                tracing::warn!("Sign-in failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Local state goes first; the remote call can only fail quietly.
    pub async fn sign_out(&self) {
        let previous = self.store.get();
        self.store.clear();
        record_auth_event("sign_out", "ok");

        let Some(credential) = previous else {
            return;
        };
        tracing::info!("Signed out {}", credential.user.uid);

        if let Err(e) = self.provider.sign_out(&credential.id_token).await {
            tracing::warn!("Remote sign-out failed (ignored): {}", e);
        }
    }

    /// The current bearer token, refreshed first when stale or when
    /// `force_refresh` is set. `None` means the caller must sign in.
    pub async fn current_token(&self, force_refresh: bool) -> Option<String> {
        self.session_token_inner(force_refresh)
            .await
            .map(|t| t.token)
    }

    async fn session_token_inner(&self, force_refresh: bool) -> Option<SessionToken> {
        let (credential, epoch) = self.store.snapshot()?;

        let stale = credential.is_older_than(self.refresh_after, Utc::now());
        if !force_refresh && !stale {
            return Some(SessionToken {
                token: credential.id_token,
                epoch,
            });
        }

        let _refreshing = self.refreshing.lock().await;
        let (credential, epoch) = match self.store.snapshot() {
            // Signed out or rejected while waiting.
            None => return None,
            Some((current, current_epoch)) if current_epoch != epoch => {
                return Some(SessionToken {
                    token: current.id_token,
                    epoch: current_epoch,
                });
            }
            Some((current, _)) if current.id_token != credential.id_token => {
                tracing::debug!("Token was refreshed by a concurrent caller");
                return Some(SessionToken {
                    token: current.id_token,
                    epoch,
                });
            }
            Some(snapshot) => snapshot,
        };

        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::debug!("No refresh token held; using the current token as is");
            return (!force_refresh).then(|| SessionToken {
                token: credential.id_token,
                epoch,
            });
        };

        let refreshed = retry_transient(
            &self.retry,
            || self.provider.refresh(&refresh_token),
            ProviderError::is_transient,
        )
        .await;

        match refreshed {
            Ok(session) => {
                let renewed = Credential {
                    issued_at: token_issued_at(&session.id_token).unwrap_or_else(Utc::now),
                    refresh_token: session.refresh_token.or(Some(refresh_token)),
                    user: UserRef {
                        uid: session.uid,
                        email: credential.user.email,
                    },
                    id_token: session.id_token,
                };
                let token = renewed.id_token.clone();
                if !self.store.replace_token(epoch, renewed) {
                    tracing::debug!("Session ended during token refresh; discarding new token");
                    record_auth_event("refresh", "discarded");
                    return None;
                }
                record_auth_event("refresh", "ok");
                Some(SessionToken { token, epoch })
            }
            Err(e) if e.is_transient() => {
                record_auth_event("refresh", "unavailable");
                tracing::warn!("Token refresh unavailable: {}", e);
                (!force_refresh).then(|| SessionToken {
                    token: credential.id_token,
                    epoch,
                })
            }
            Err(e) => {
                record_auth_event("refresh", "rejected");
                tracing::warn!("Token refresh rejected, ending session: {}", e);
                self.store.invalidate(epoch);
                None
            }
        }
    }

    fn establish(&self, session: ProviderSession, email: &str) -> Credential {
        let credential = Credential {
            issued_at: token_issued_at(&session.id_token).unwrap_or_else(Utc::now),
            refresh_token: session.refresh_token,
            user: UserRef {
                uid: session.uid,
                email: session.email.unwrap_or_else(|| email.to_string()),
            },
            id_token: session.id_token,
        };
        self.store.set(credential.clone());
        tracing::info!("Session established for {}", credential.user.uid);
        credential
    }
}

#[async_trait]
impl TokenSource for AuthGateway {
    async fn session_token(&self) -> Option<SessionToken> {
        self.session_token_inner(false).await
    }
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("store", &self.store)
            .field("refresh_after", &self.refresh_after)
            .finish_non_exhaustive()
    }
}
