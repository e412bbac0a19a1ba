#![allow(dead_code)]

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use dashboard_session::{
    config::{ApiSettings, Config, IdentitySettings, SessionSettings},
    models::credential::{Credential, UserRef},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tokens the stub backend accepts start with this.
pub const VALID_TOKEN_PREFIX: &str = "valid-token";
pub const API_KEY: &str = "test-key";
pub const TEACHER_EMAIL: &str = "teacher@school.test";
pub const TEACHER_PASSWORD: &str = "secret1";
pub const TAKEN_EMAIL: &str = "taken@school.test";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
}

#[derive(Default)]
pub struct StubState {
    pub profile_hits: AtomicUsize,
    pub refresh_hits: AtomicUsize,
    pub uploads: Mutex<Vec<ReceivedUpload>>,
}

/// In-process backend plus identity provider on an ephemeral port.
pub struct StubBackend {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl StubBackend {
    pub async fn start() -> Self {
        init_tracing();

        let state = Arc::new(StubState::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn config(&self, credential_path: Option<PathBuf>) -> Config {
        Config {
            api: ApiSettings {
                base_url: self.api_url(),
            },
            identity: IdentitySettings {
                base_url: format!("http://{}/identity/v1", self.addr),
                token_url: format!("http://{}/identity/token", self.addr),
                api_key: API_KEY.to_string(),
            },
            session: SessionSettings {
                credential_path,
                ..SessionSettings::default()
            },
            ..Config::default()
        }
    }

    pub fn profile_hits(&self) -> usize {
        self.state.profile_hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A base URL nothing is listening on.
pub async fn unreachable_api_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

pub fn credential(token: &str) -> Credential {
    Credential {
        id_token: token.to_string(),
        refresh_token: Some(format!("{}-refresh", token)),
        issued_at: Utc::now(),
        user: UserRef {
            uid: "uid-1".to_string(),
            email: TEACHER_EMAIL.to_string(),
        },
    }
}

fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/api/auth/profile", get(profile))
        .route("/api/headers", get(echo_headers))
        .route("/api/slow", get(slow))
        .route("/api/expired", get(expired))
        .route("/api/forbidden", get(forbidden))
        .route("/api/boom", get(boom))
        .route("/api/not-json", get(not_json))
        .route("/api/empty", get(empty))
        .route("/api/assessments/configs", get(assessment_configs))
        .route("/api/learning-paths/analytics", get(path_analytics))
        .route("/api/learning-paths/student/{id}", get(student_paths))
        .route("/api/lessons/generate", post(generate_lesson))
        .route("/api/lessons/{id}/progress", post(lesson_progress))
        .route("/api/documents/upload", post(document_upload))
        .route("/api/documents/{id}/status", get(document_status))
        .route("/api/students/bulk-import", post(bulk_import))
        .route("/identity/v1/accounts:signInWithPassword", post(identity_sign_in))
        .route("/identity/v1/accounts:signUp", post(identity_sign_up))
        .route("/identity/token", post(identity_refresh))
        .with_state(state)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authorized(headers: &HeaderMap) -> bool {
    bearer(headers).is_some_and(|token| token.starts_with(VALID_TOKEN_PREFIX))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Token expired"})),
    )
}

async fn profile(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.profile_hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"data": {
            "role": "teacher",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": TEACHER_EMAIL,
            "schoolId": "school-7"
        }})),
    )
}

async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "authorization": headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Json(json!({"ok": true}))
}

async fn expired() -> (StatusCode, Json<Value>) {
    unauthorized()
}

async fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"message": "Not your school"})),
    )
}

async fn boom() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn not_json() -> (StatusCode, &'static str) {
    (StatusCode::OK, "<html>maintenance</html>")
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn assessment_configs(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"data": [
            {"config_id": "c1", "name": "Algebra Quiz", "subject": "Math"},
            {"id": "c2", "title": "Cells", "subject": "Biology", "grade": 7,
             "topics": ["Cells", "Mitosis"], "question_count": 12, "duration": 20,
             "difficulty": "hard", "created_at": "2024-03-01T10:00:00Z"},
            {"name": "No identifier"}
        ]})),
    )
}

fn sample_path(path_id: &str, student_id: &str) -> Value {
    json!({
        "path_id": path_id,
        "student_id": student_id,
        "title": "Fractions",
        "status": "completed",
        "progress_percentage": 100,
        "steps": [
            {"step_id": "s1", "title": "Halves", "status": "completed", "progress_percentage": 100},
            {"step_id": "s2", "title": "Quarters", "status": "in_progress", "progress_percentage": 40}
        ]
    })
}

async fn student_paths(Path(student_id): Path<String>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"learning_paths": [sample_path("p1", &student_id)]})),
    )
}

async fn path_analytics(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "average_progress": 12,
            "paths": [
                sample_path("p1", "stu-1"),
                {"path_id": "p2", "student_id": "stu-2", "status": "paused", "steps": [
                    {"status": "not_started"}
                ]}
            ]
        })),
    )
}

async fn generate_lesson(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let topic = body
        .get("topic")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if topic.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": [
                {"loc": ["body", "topic"], "msg": "Field required", "type": "missing"}
            ]})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"lesson_id": "lesson-1", "topic": topic})),
    )
}

async fn lesson_progress(
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"lesson_id": lesson_id, "received": body})),
    )
}

async fn document_status(Path(document_id): Path<String>) -> Json<Value> {
    Json(json!({"data": {"id": document_id, "status": "processed"}}))
}

async fn read_upload(state: &StubState, mut multipart: Multipart) -> Option<String> {
    let mut text = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap();
        state.uploads.lock().push(ReceivedUpload {
            field: name,
            file_name,
            content_type,
            size: bytes.len(),
        });
        text = Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    text
}

async fn document_upload(
    State(state): State<Arc<StubState>>,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    match read_upload(&state, multipart).await {
        Some(_) => (StatusCode::OK, Json(json!({"document_id": "doc-1"}))),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "No file uploaded"})),
        ),
    }
}

/// One student per CSV row after the header; rows without an `@` fail.
async fn bulk_import(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let Some(text) = read_upload(&state, multipart).await else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "No file uploaded"})),
        );
    };

    let mut created = 0;
    let mut errors = Vec::new();
    for (index, line) in text.lines().skip(1).enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if line.contains('@') {
            created += 1;
        } else {
            errors.push(json!({"row": index + 2, "error": "Invalid email"}));
        }
    }

    (
        StatusCode::OK,
        Json(json!({"data": {
            "created": created,
            "updated": 0,
            "errors": errors
        }})),
    )
}

fn identity_error(code: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": {"code": 400, "message": code, "errors": []}})),
    )
}

fn key_ok(params: &HashMap<String, String>) -> bool {
    params.get("key").map(String::as_str) == Some(API_KEY)
}

async fn identity_sign_in(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !key_ok(&params) {
        return identity_error("API_KEY_INVALID");
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

    if email != TEACHER_EMAIL {
        return identity_error("EMAIL_NOT_FOUND");
    }
    if password != TEACHER_PASSWORD {
        return identity_error("INVALID_PASSWORD : The password is invalid or the user does not have a password.");
    }
    (
        StatusCode::OK,
        Json(json!({
            "idToken": "valid-token-1",
            "refreshToken": "refresh-1",
            "localId": "uid-1",
            "email": email,
            "expiresIn": "3600"
        })),
    )
}

async fn identity_sign_up(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !key_ok(&params) {
        return identity_error("API_KEY_INVALID");
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email == TAKEN_EMAIL {
        return identity_error("EMAIL_EXISTS");
    }
    (
        StatusCode::OK,
        Json(json!({
            "idToken": "valid-token-new",
            "refreshToken": "refresh-new",
            "localId": "uid-new",
            "email": email,
            "expiresIn": "3600"
        })),
    )
}

async fn identity_refresh(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.refresh_hits.fetch_add(1, Ordering::SeqCst);
    if body.get("grant_type").and_then(Value::as_str) != Some("refresh_token") {
        return identity_error("INVALID_GRANT_TYPE");
    }
    match body.get("refresh_token").and_then(Value::as_str) {
        Some(token) if token.starts_with("refresh-") => (
            StatusCode::OK,
            Json(json!({
                "id_token": "valid-token-refreshed",
                "refresh_token": token,
                "user_id": "uid-1",
                "expires_in": "3600"
            })),
        ),
        _ => identity_error("INVALID_REFRESH_TOKEN"),
    }
}
