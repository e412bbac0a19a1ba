//! Client-side session and data-orchestration layer for the school dashboard:
//! credential storage, identity-provider sign-in, the authenticated backend
//! client, view-model adapters, bulk-import uploads and the page guard.

pub mod adapters;
pub mod config;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::api_client::{ApiClient, ApiError, ApiErrorKind, TokenSource};
pub use services::auth_gateway::{AuthError, AuthErrorCode, AuthGateway};
pub use services::credential_store::{CredentialStore, SessionEpoch};
pub use services::session_guard::{GuardOutcome, SessionGuard};
pub use services::upload_orchestrator::{
    UploadOrchestrator, UploadOutcome, UploadResultPartialFailure, UploadValidationError,
};
pub use services::AppState;
