use std::sync::Arc;

use crate::config::Config;

pub mod api_client;
pub mod auth_gateway;
pub mod credential_store;
pub mod endpoints;
pub mod identity_provider;
pub mod session_guard;
pub mod upload_orchestrator;

use api_client::ApiClient;
use auth_gateway::AuthGateway;
use credential_store::{CredentialPersistence, CredentialStore, FilePersistence, MemoryPersistence};
use identity_provider::{IdentityProvider, RestIdentityProvider};
use session_guard::SessionGuard;
use upload_orchestrator::UploadOrchestrator;

/// Every session component wired to one credential store.
pub struct AppState {
    pub config: Config,
    pub store: Arc<CredentialStore>,
    pub auth: Arc<AuthGateway>,
    pub api: Arc<ApiClient>,
    pub uploads: Arc<UploadOrchestrator>,
    pub guard: Arc<SessionGuard>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::new();
        let provider = Arc::new(RestIdentityProvider::with_client(
            http_client.clone(),
            &config.identity,
        )?);
        Self::assemble(config, http_client, provider)
    }

    /// Same wiring with a caller-supplied identity provider.
    pub fn with_provider(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        Self::assemble(config, reqwest::Client::new(), provider)
    }

    fn assemble(
        config: Config,
        http_client: reqwest::Client,
        provider: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let persistence: Box<dyn CredentialPersistence> = match &config.session.credential_path {
            Some(path) => {
                tracing::info!("Persisting credentials to {}", path.display());
                Box::new(FilePersistence::new(path))
            }
            None => Box::new(MemoryPersistence),
        };
        let store = Arc::new(CredentialStore::new(persistence));

        let auth = Arc::new(AuthGateway::new(provider, store.clone(), &config.session));
        let api = Arc::new(ApiClient::with_client(
            http_client,
            &config.api.base_url,
            auth.clone(),
            store.clone(),
        )?);
        let uploads = Arc::new(UploadOrchestrator::new(api.clone(), config.upload.clone()));
        let guard = Arc::new(SessionGuard::new(
            store.clone(),
            api.clone(),
            config.session.sign_in_path.clone(),
        ));

        tracing::info!("Session layer ready for {}", config.api.base_url);

        Ok(Self {
            config,
            store,
            auth,
            api,
            uploads,
            guard,
        })
    }
}
