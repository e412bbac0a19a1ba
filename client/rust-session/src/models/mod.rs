pub mod analytics;
pub mod assessment;
pub mod credential;
pub mod learning_path;
pub mod upload;
pub mod user;

pub use analytics::DashboardAnalytics;
pub use assessment::{AssessmentStats, AssessmentSummary, Difficulty};
pub use credential::{Credential, UserRef};
pub use learning_path::{LearningPath, LearningStep, PathStatus, StepStatus};
pub use upload::{BulkImportResult, FileInfo, RecordFailure, UploadJob, UploadStatus};
pub use user::{NavItem, RoleConfig, UserProfile, UserRole};
