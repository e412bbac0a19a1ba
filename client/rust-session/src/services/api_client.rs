use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use super::credential_store::{CredentialStore, SessionEpoch};
use crate::metrics::record_api_request;

pub const MALFORMED_RESPONSE_MESSAGE: &str = "Malformed response from server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// No response at all: connection refused, DNS, transport timeout.
    NetworkFailure,
    /// 401/403. Credentials have already been cleared.
    AuthExpired,
    /// Any other 4xx.
    ValidationFailure,
    /// 5xx or an unreadable success body.
    ServerFailure,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::NetworkFailure => "network_failure",
            ApiErrorKind::AuthExpired => "auth_expired",
            ApiErrorKind::ValidationFailure => "validation_failure",
            ApiErrorKind::ServerFailure => "server_failure",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ApiErrorKind::NetworkFailure => {
                "Unable to reach the server. Please check your connection and try again."
            }
            ApiErrorKind::AuthExpired => "Your session has expired. Please sign in again.",
            ApiErrorKind::ValidationFailure => "The request could not be processed.",
            ApiErrorKind::ServerFailure => "Something went wrong on our end. Please try again later.",
        }
    }
}

/// Normalized failure of one backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, absent when no response arrived.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, status: Option<u16>, message: Option<String>) -> Self {
        Self {
            kind,
            status,
            message: message.unwrap_or_else(|| kind.default_message().to_string()),
        }
    }

    pub fn network() -> Self {
        Self::new(ApiErrorKind::NetworkFailure, None, None)
    }

    pub fn malformed(status: Option<u16>) -> Self {
        Self::new(
            ApiErrorKind::ServerFailure,
            status,
            Some(MALFORMED_RESPONSE_MESSAGE.to_string()),
        )
    }

    fn from_response(kind: ApiErrorKind, status: StatusCode, body: &[u8]) -> Self {
        Self::new(kind, Some(status.as_u16()), extract_message(body))
    }

    pub fn is_auth_expired(&self) -> bool {
        self.kind == ApiErrorKind::AuthExpired
    }
}

/// A bearer token together with the session epoch it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub epoch: SessionEpoch,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Supplies the token attached to outgoing requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn session_token(&self) -> Option<SessionToken>;
}

/// Uses whatever is stored, without refreshing.
#[async_trait]
impl TokenSource for CredentialStore {
    async fn session_token(&self) -> Option<SessionToken> {
        self.snapshot().map(|(credential, epoch)| SessionToken {
            token: credential.id_token,
            epoch,
        })
    }
}

/// Authenticated JSON client for the dashboard backend.
///
/// Every call returns either the decoded body or a classified [`ApiError`].
/// A 401/403 clears the credential store before the error is returned, and
/// any request whose session was revoked while it was in flight also comes
/// back as `AuthExpired`.
#[derive(Clone)]
pub struct ApiClient {
    http_client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    store: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
        store: Arc<CredentialStore>,
    ) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), base_url, tokens, store)
    }

    pub fn with_client(
        http_client: Client,
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
        store: Arc<CredentialStore>,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("API base URL cannot carry paths: {}", base_url);
        }
        Ok(Self {
            http_client,
            base_url,
            tokens,
            store,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a JSON request to `path` (relative to the base URL; may carry a
    /// query string).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.endpoint(&segments)?;
        url.set_query(query);
        self.send_json(method, url, body).await
    }

    /// Like [`request`](Self::request) but with each path segment encoded
    /// separately, for paths carrying caller-supplied ids.
    pub(crate) async fn request_segments(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint(segments)?;
        self.send_json(method, url, body).await
    }

    async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let label = url.path().to_string();
        let builder = self.http_client.request(method.clone(), url);
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        self.execute(method.as_str(), &label, builder).await
    }

    /// Sends `bytes` as a single-part `multipart/form-data` upload.
    pub async fn upload_file(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, ApiError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let url = self.endpoint(&segments)?;

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| {
                tracing::warn!("Rejected upload part for {}: {}", file_name, e);
                ApiError::new(ApiErrorKind::ValidationFailure, None, None)
            })?;
        let form = Form::new().part(field.to_string(), part);

        let builder = self.http_client.post(url).multipart(form);
        self.execute("POST", path, builder).await
    }

    /// Joins percent-encoded `segments` onto the base URL's path.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                return Err(ApiError::new(
                    ApiErrorKind::ValidationFailure,
                    None,
                    Some(format!("Cannot build a request URL from {}", self.base_url)),
                ));
            };
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn execute(
        &self,
        method: &str,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<Value, ApiError> {
        let started = Instant::now();
        let session = self.tokens.session_token().await;
        let epoch = session.as_ref().map(|s| s.epoch);
        let builder = match &session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        };

        let result = self.dispatch(builder, epoch).await;

        match &result {
            Ok(_) => {
                record_api_request(method, "ok", started);
                tracing::debug!("{} {} succeeded", method, path);
            }
            Err(e) => {
                record_api_request(method, e.kind.as_str(), started);
                match e.kind {
                    ApiErrorKind::ServerFailure => tracing::error!(
                        "{} {} failed with {:?}: {}",
                        method,
                        path,
                        e.status,
                        e.message
                    ),
                    _ => tracing::warn!(
                        "{} {} failed ({}, {:?}): {}",
                        method,
                        path,
                        e.kind.as_str(),
                        e.status,
                        e.message
                    ),
                }
            }
        }
        result
    }

    async fn dispatch(
        &self,
        builder: RequestBuilder,
        epoch: Option<SessionEpoch>,
    ) -> Result<Value, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::debug!("Transport error: {}", e);
            ApiError::network()
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            tracing::debug!("Failed to read response body: {}", e);
            ApiError::network()
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            if let Some(epoch) = epoch {
                if self.store.invalidate(epoch) {
                    tracing::info!("Session rejected by backend ({}); credentials cleared", status);
                }
            }
            return Err(ApiError::from_response(ApiErrorKind::AuthExpired, status, &body));
        }

        // Another request ended this session while we were waiting.
        if let Some(epoch) = epoch {
            if self.store.is_revoked(epoch) {
                return Err(ApiError::new(
                    ApiErrorKind::AuthExpired,
                    Some(status.as_u16()),
                    None,
                ));
            }
        }

        if status.is_client_error() {
            return Err(ApiError::from_response(
                ApiErrorKind::ValidationFailure,
                status,
                &body,
            ));
        }
        if !status.is_success() {
            return Err(ApiError::from_response(
                ApiErrorKind::ServerFailure,
                status,
                &body,
            ));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!("Undecodable success body: {}", e);
            ApiError::malformed(Some(status.as_u16()))
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Pulls a readable message out of an error body. Understands `message`,
/// `detail` (string or a list of `{msg}` entries) and `error` (string or
/// `{message}`).
pub(crate) fn extract_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let obj = value.as_object()?;

    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    if let Some(message) = obj.get("message").and_then(Value::as_str).and_then(non_empty) {
        return Some(message);
    }

    match obj.get("detail") {
        Some(Value::String(detail)) => {
            if let Some(detail) = non_empty(detail) {
                return Some(detail);
            }
        }
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => non_empty(s),
                    Value::Object(entry) => {
                        entry.get("msg").and_then(Value::as_str).and_then(non_empty)
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
        _ => {}
    }

    match obj.get("error") {
        Some(Value::String(error)) => non_empty(error),
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .and_then(non_empty),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn client(base_url: &str) -> ApiClient {
        let store = Arc::new(CredentialStore::in_memory());
        ApiClient::new(base_url, store.clone(), store).unwrap()
    }

    #[test]
    fn message_sources_in_priority_order() {
        assert_eq!(
            extract_message(&body(json!({"message": "Bad file", "detail": "ignored"}))),
            Some("Bad file".into())
        );
        assert_eq!(
            extract_message(&body(json!({"detail": "Student not found"}))),
            Some("Student not found".into())
        );
        assert_eq!(
            extract_message(&body(json!({"detail": [
                {"loc": ["body", "email"], "msg": "field required"},
                {"loc": ["body", "grade"], "msg": "value is not a valid integer"}
            ]}))),
            Some("field required; value is not a valid integer".into())
        );
        assert_eq!(
            extract_message(&body(json!({"error": {"message": "Quota exceeded"}}))),
            Some("Quota exceeded".into())
        );
        assert_eq!(
            extract_message(&body(json!({"error": "Not allowed"}))),
            Some("Not allowed".into())
        );
    }

    #[test]
    fn unusable_bodies_have_no_message() {
        assert_eq!(extract_message(b""), None);
        assert_eq!(extract_message(b"<html>502</html>"), None);
        assert_eq!(extract_message(&body(json!({"message": "  "}))), None);
        assert_eq!(extract_message(&body(json!(["message"]))), None);
    }

    #[test]
    fn errors_fall_back_to_kind_defaults() {
        let err = ApiError::new(ApiErrorKind::ServerFailure, Some(500), None);
        assert_eq!(err.to_string(), ApiErrorKind::ServerFailure.default_message());
        assert_eq!(ApiError::network().status, None);
        assert_eq!(ApiError::malformed(Some(200)).message, MALFORMED_RESPONSE_MESSAGE);
    }

    #[test]
    fn endpoints_extend_the_base_path() {
        let api = client("http://localhost:8000/api/");
        assert_eq!(
            api.endpoint(&["learning-paths", "student", "a b/c"]).unwrap().as_str(),
            "http://localhost:8000/api/learning-paths/student/a%20b%2Fc"
        );
    }

    #[test]
    fn unusable_base_urls_fail_at_construction() {
        let store = Arc::new(CredentialStore::in_memory());
        assert!(ApiClient::new("localhost without scheme", store.clone(), store.clone()).is_err());
        assert!(ApiClient::new("mailto:admin@school.test", store.clone(), store).is_err());
    }

    #[test]
    fn upload_mime_follows_extension() {
        assert_eq!(mime_for("students.CSV"), "text/csv");
        assert_eq!(mime_for("notes"), "application/octet-stream");
    }

    #[tokio::test]
    async fn store_token_source_carries_the_epoch() {
        use crate::models::credential::{Credential, UserRef};

        let store = CredentialStore::in_memory();
        assert!(store.session_token().await.is_none());

        let epoch = store.set(Credential {
            id_token: "t1".into(),
            refresh_token: None,
            issued_at: chrono::Utc::now(),
            user: UserRef {
                uid: "u1".into(),
                email: "teacher@school.test".into(),
            },
        });
        let token = store.session_token().await.unwrap();
        assert_eq!(token.token, "t1");
        assert_eq!(token.epoch, epoch);
    }
}
