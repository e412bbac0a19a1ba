use async_trait::async_trait;
use std::sync::Arc;

use super::api_client::{ApiError, ApiErrorKind};
use super::credential_store::CredentialStore;
use crate::models::user::{RoleConfig, UserProfile};

/// Where the guard loads the signed-in user's profile from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError>;
}

/// What a protected page has to work with once the guard lets it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSession {
    pub profile: UserProfile,
    pub role_config: &'static RoleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    SignInAgain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Leave the page for `to`; nothing else should load.
    Redirect { to: String },
    /// The profile could not be loaded for a reason other than auth.
    Recoverable {
        message: String,
        actions: Vec<RecoveryAction>,
    },
    Ready(PageSession),
}

impl GuardOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, GuardOutcome::Ready(_))
    }
}

/// Decides, once per protected page activation, whether the page may render.
pub struct SessionGuard {
    store: Arc<CredentialStore>,
    profiles: Arc<dyn ProfileSource>,
    sign_in_path: String,
}

impl SessionGuard {
    pub fn new(
        store: Arc<CredentialStore>,
        profiles: Arc<dyn ProfileSource>,
        sign_in_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            profiles,
            sign_in_path: sign_in_path.into(),
        }
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    pub async fn activate(&self) -> GuardOutcome {
        if !self.store.is_authenticated() {
            tracing::debug!("No stored credential; redirecting to {}", self.sign_in_path);
            return self.redirect();
        }

        match self.profiles.fetch_profile().await {
            Ok(profile) => {
                let role_config = profile.role.config();
                tracing::debug!("Page session ready for {} ({})", profile.email, profile.role);
                GuardOutcome::Ready(PageSession {
                    profile,
                    role_config,
                })
            }
            Err(e) if e.kind == ApiErrorKind::AuthExpired => {
                tracing::info!("Session expired while loading profile; redirecting");
                self.redirect()
            }
            Err(e) => {
                tracing::warn!("Profile unavailable: {}", e);
                GuardOutcome::Recoverable {
                    message: e.message,
                    actions: vec![RecoveryAction::Retry, RecoveryAction::SignInAgain],
                }
            }
        }
    }

    /// The "sign in again" action of a recoverable state.
    pub fn re_authenticate(&self) -> GuardOutcome {
        self.store.clear();
        self.redirect()
    }

    fn redirect(&self) -> GuardOutcome {
        GuardOutcome::Redirect {
            to: self.sign_in_path.clone(),
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("sign_in_path", &self.sign_in_path)
            .finish_non_exhaustive()
    }
}
