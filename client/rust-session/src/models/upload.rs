use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct RecordFailure {
    pub row: Option<u32>,
    pub identifier: Option<String>,
    pub reason: String,
}

/// Server-side summary of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct BulkImportResult {
    pub total: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub failures: Vec<RecordFailure>,
}

impl BulkImportResult {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Upload job cannot go from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: UploadStatus,
    pub to: UploadStatus,
}

/// One bulk-import file moving through validation, transfer and reporting.
///
/// Status only moves forward; the transition methods refuse anything else,
/// so a terminal job can only be replaced, never revived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub file: FileInfo,
    status: UploadStatus,
    progress: u8,
    result: Option<BulkImportResult>,
    error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadJob {
    pub fn new(file: FileInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            status: UploadStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn result(&self) -> Option<&BulkImportResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn start_upload(&mut self) -> Result<(), TransitionError> {
        self.expect_status(UploadStatus::Pending, UploadStatus::Uploading)?;
        self.status = UploadStatus::Uploading;
        Ok(())
    }

    /// Simulated progress: moves by `step` but never past `ceiling`, and only
    /// while uploading. Returns whether anything changed.
    pub fn advance_progress(&mut self, step: u8, ceiling: u8) -> bool {
        if self.status != UploadStatus::Uploading || self.progress >= ceiling {
            return false;
        }
        self.progress = self.progress.saturating_add(step).min(ceiling);
        true
    }

    pub fn succeed(&mut self, result: BulkImportResult) -> Result<(), TransitionError> {
        self.expect_status(UploadStatus::Uploading, UploadStatus::Success)?;
        self.status = UploadStatus::Success;
        self.progress = 100;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, message: String) -> Result<(), TransitionError> {
        self.expect_status(UploadStatus::Uploading, UploadStatus::Error)?;
        self.status = UploadStatus::Error;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn expect_status(&self, from: UploadStatus, to: UploadStatus) -> Result<(), TransitionError> {
        if self.status == from {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> UploadJob {
        UploadJob::new(FileInfo {
            name: "students.csv".into(),
            byte_size: 128,
        })
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = job();
        assert_eq!(job.status(), UploadStatus::Pending);
        job.start_upload().unwrap();
        assert!(job.advance_progress(10, 90));
        assert_eq!(job.progress(), 10);
        job.succeed(BulkImportResult::default()).unwrap();
        assert_eq!(job.status(), UploadStatus::Success);
        assert_eq!(job.progress(), 100);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn progress_stops_at_ceiling() {
        let mut job = job();
        job.start_upload().unwrap();
        for _ in 0..20 {
            job.advance_progress(15, 90);
        }
        assert_eq!(job.progress(), 90);
        assert!(!job.advance_progress(15, 90));
    }

    #[test]
    fn progress_does_not_move_outside_uploading() {
        let mut job = job();
        assert!(!job.advance_progress(10, 90));
        job.start_upload().unwrap();
        job.fail("boom".into()).unwrap();
        assert!(!job.advance_progress(10, 90));
        assert_eq!(job.progress(), 0);
    }

    #[test]
    fn terminal_jobs_cannot_move() {
        let mut job = job();
        job.start_upload().unwrap();
        job.fail("Server error".into()).unwrap();

        assert_eq!(
            job.start_upload(),
            Err(TransitionError {
                from: UploadStatus::Error,
                to: UploadStatus::Uploading
            })
        );
        assert!(job.succeed(BulkImportResult::default()).is_err());
        assert!(job.fail("again".into()).is_err());
        assert_eq!(job.status(), UploadStatus::Error);
        assert_eq!(job.error(), Some("Server error"));
    }

    #[test]
    fn pending_job_cannot_finish_without_uploading() {
        let mut job = job();
        assert!(job.succeed(BulkImportResult::default()).is_err());
        assert!(job.fail("nope".into()).is_err());
        assert_eq!(job.status(), UploadStatus::Pending);
    }
}
