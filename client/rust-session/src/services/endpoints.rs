//! Typed wrappers over the backend endpoint groups the dashboard uses.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::api_client::{ApiClient, ApiError, ApiErrorKind};
use super::session_guard::ProfileSource;
use super::upload_orchestrator::BulkImportUploader;
use crate::adapters::{
    adapt_assessments, adapt_bulk_import_result, adapt_dashboard_analytics, adapt_learning_paths,
    Normalized, Payload,
};
use crate::models::{
    AssessmentSummary, BulkImportResult, DashboardAnalytics, Difficulty, LearningPath, UserProfile,
};

/// Multipart field every upload endpoint reads the file from.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize)]
pub struct GenerateLessonRequest {
    pub student_id: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LessonProgressUpdate {
    pub progress_percentage: u8,
    pub completed: bool,
}

impl LessonProgressUpdate {
    pub fn new(progress_percentage: u8) -> Self {
        let progress_percentage = progress_percentage.min(100);
        Self {
            progress_percentage,
            completed: progress_percentage == 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentStatus {
    #[serde(alias = "id")]
    pub document_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiClient {
    /// `GET /auth/profile`. A body that is not a profile is a server fault.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let raw = self.request(Method::GET, "/auth/profile", None).await?;
        decode_record(&raw, &["user", "profile"])
    }

    pub async fn list_assessments(&self) -> Result<Normalized<AssessmentSummary>, ApiError> {
        let raw = self
            .request(Method::GET, "/assessments/configs", None)
            .await?;
        Ok(adapt_assessments(&raw))
    }

    pub async fn learning_paths_for_student(
        &self,
        student_id: &str,
    ) -> Result<Normalized<LearningPath>, ApiError> {
        let raw = self
            .request_segments(Method::GET, &["learning-paths", "student", student_id], None)
            .await?;
        Ok(adapt_learning_paths(&raw))
    }

    pub async fn learning_path_analytics(&self) -> Result<DashboardAnalytics, ApiError> {
        let raw = self
            .request(Method::GET, "/learning-paths/analytics", None)
            .await?;
        Ok(adapt_dashboard_analytics(&raw))
    }

    pub async fn generate_lesson(&self, request: &GenerateLessonRequest) -> Result<Value, ApiError> {
        let body = to_body(request)?;
        self.request(Method::POST, "/lessons/generate", Some(&body))
            .await
    }

    pub async fn update_lesson_progress(
        &self,
        lesson_id: &str,
        update: LessonProgressUpdate,
    ) -> Result<Value, ApiError> {
        let body = to_body(&update)?;
        self.request_segments(Method::POST, &["lessons", lesson_id, "progress"], Some(&body))
            .await
    }

    pub async fn upload_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value, ApiError> {
        self.upload_file("/documents/upload", UPLOAD_FIELD, file_name, bytes)
            .await
    }

    pub async fn document_status(&self, document_id: &str) -> Result<DocumentStatus, ApiError> {
        let raw = self
            .request_segments(Method::GET, &["documents", document_id, "status"], None)
            .await?;
        decode_record(&raw, &["document"])
    }

    pub async fn bulk_import_students(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<BulkImportResult, ApiError> {
        let raw = self
            .upload_file("/students/bulk-import", UPLOAD_FIELD, file_name, bytes)
            .await?;
        Ok(adapt_bulk_import_result(&raw))
    }
}

#[async_trait]
impl ProfileSource for ApiClient {
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        ApiClient::fetch_profile(self).await
    }
}

#[async_trait]
impl BulkImportUploader for ApiClient {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<BulkImportResult, ApiError> {
        self.bulk_import_students(file_name, bytes).await
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| {
        tracing::warn!("Failed to encode request body: {}", e);
        ApiError::new(ApiErrorKind::ValidationFailure, None, None)
    })
}

/// Decodes a single record that may arrive bare or under `data` or one of
/// `wrapper_keys`.
fn decode_record<T: serde::de::DeserializeOwned>(
    raw: &Value,
    wrapper_keys: &[&str],
) -> Result<T, ApiError> {
    let Payload::Single(obj) = Payload::classify(raw, wrapper_keys) else {
        return Err(ApiError::malformed(None));
    };
    serde_json::from_value(Value::Object(obj.clone())).map_err(|e| {
        tracing::debug!("Unexpected record shape: {}", e);
        ApiError::malformed(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use serde_json::json;

    #[test]
    fn profile_decodes_bare_and_wrapped() {
        let bare = json!({"role": "teacher", "firstName": "Ada", "email": "ada@school.test"});
        let wrapped = json!({"user": bare.clone()});

        for raw in [bare, wrapped] {
            let profile: UserProfile = decode_record(&raw, &["user", "profile"]).unwrap();
            assert_eq!(profile.role, UserRole::Teacher);
            assert_eq!(profile.first_name, "Ada");
        }
    }

    #[test]
    fn non_profile_bodies_are_malformed() {
        for raw in [Value::Null, json!([]), json!({"role": "janitor", "email": "x"})] {
            let err = decode_record::<UserProfile>(&raw, &["user"]).unwrap_err();
            assert_eq!(err.message, crate::services::api_client::MALFORMED_RESPONSE_MESSAGE);
        }
    }

    #[test]
    fn progress_update_marks_completion() {
        assert!(LessonProgressUpdate::new(100).completed);
        let partial = LessonProgressUpdate::new(40);
        assert!(!partial.completed);
        assert_eq!(LessonProgressUpdate::new(250).progress_percentage, 100);
    }

    #[test]
    fn lesson_request_omits_unset_fields() {
        let body = to_body(&GenerateLessonRequest {
            student_id: "s1".into(),
            topic: "Fractions".into(),
            subject: None,
            grade: Some(5),
            difficulty: None,
        })
        .unwrap();
        assert_eq!(body, json!({"student_id": "s1", "topic": "Fractions", "grade": 5}));
    }
}
