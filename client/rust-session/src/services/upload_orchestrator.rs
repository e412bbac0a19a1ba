use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use super::api_client::ApiError;
use crate::config::UploadSettings;
use crate::metrics::record_upload_job;
use crate::models::upload::{BulkImportResult, FileInfo, UploadJob, UploadStatus};

/// Sends a validated bulk-import file to the backend.
#[async_trait]
pub trait BulkImportUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<BulkImportResult, ApiError>;
}

/// Rejections raised before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadValidationError {
    #[error("Please select a .{expected} file")]
    WrongExtension { expected: String },
    #[error("File is too large. Maximum size is {}", size_label(.max_bytes))]
    TooLarge { size: u64, max_bytes: u64 },
    #[error("The selected file is empty")]
    Empty,
    #[error("An upload is already in progress")]
    JobInFlight,
    #[error("Discard the failed upload before selecting another file")]
    FailedJobNotDiscarded,
    #[error("No file is ready to upload")]
    NothingToSubmit,
}

fn size_label(bytes: &u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    match *bytes {
        b if b >= MIB && b % MIB == 0 => format!("{} MB", b / MIB),
        b if b >= MIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{} KB", b / KIB),
        b => format!("{} bytes", b),
    }
}

/// A successful upload whose result still lists rejected records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failed} of {total} records could not be imported")]
pub struct UploadResultPartialFailure {
    pub failed: u32,
    pub total: u32,
}

/// A file picked by the user, not yet validated.
#[derive(Clone)]
pub struct FileSelection {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileSelection {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for FileSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSelection")
            .field("name", &self.name)
            .field("byte_size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        job: UploadJob,
        partial_failure: Option<UploadResultPartialFailure>,
    },
    Failed {
        job: UploadJob,
        error: ApiError,
    },
    /// The job was discarded while the transfer was running; the server's
    /// answer was dropped.
    Discarded { job_id: Uuid },
}

pub type CompletionCallback = Arc<dyn Fn(&BulkImportResult) + Send + Sync>;

pub const INTERRUPTED_MESSAGE: &str = "The upload was interrupted before the server answered.";

#[derive(Default)]
struct Slot {
    job: Option<UploadJob>,
    /// Held between selection and submission only.
    bytes: Option<Vec<u8>>,
}

struct Shared {
    slot: Mutex<Slot>,
    updates: watch::Sender<Option<UploadJob>>,
}

impl Shared {
    fn publish(&self, job: Option<UploadJob>) {
        self.updates.send_replace(job);
    }

    /// Applies `change` to the live job if it is still `job_id`, then
    /// publishes the new snapshot.
    fn update_job<F>(&self, job_id: Uuid, change: F) -> Option<UploadJob>
    where
        F: FnOnce(&mut UploadJob),
    {
        let snapshot = {
            let mut slot = self.slot.lock();
            let job = slot.job.as_mut().filter(|job| job.id == job_id)?;
            change(job);
            job.clone()
        };
        self.publish(Some(snapshot.clone()));
        Some(snapshot)
    }
}

/// Aborts the progress ticker on every exit from `submit`, and fails the job
/// if `submit` was dropped before the server answered.
struct InFlightGuard {
    shared: Arc<Shared>,
    job_id: Uuid,
    ticker: JoinHandle<()>,
    settled: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ticker.abort();
        if self.settled {
            return;
        }
        let interrupted = self.shared.update_job(self.job_id, |job| {
            if let Err(e) = job.fail(INTERRUPTED_MESSAGE.to_string()) {
                tracing::debug!("Interrupted job already settled: {}", e);
            }
        });
        if interrupted.is_some() {
            record_upload_job("interrupted");
            tracing::warn!("Upload {} interrupted", self.job_id);
        }
    }
}

/// Drives one bulk-import job at a time through validation, transfer and
/// result reporting.
pub struct UploadOrchestrator {
    uploader: Arc<dyn BulkImportUploader>,
    settings: UploadSettings,
    shared: Arc<Shared>,
    on_complete: Option<CompletionCallback>,
}

impl UploadOrchestrator {
    pub fn new(uploader: Arc<dyn BulkImportUploader>, settings: UploadSettings) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            uploader,
            settings,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                updates,
            }),
            on_complete: None,
        }
    }

    /// Called once per successful upload, typically to refresh dependent
    /// lists.
    pub fn with_on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BulkImportResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn current(&self) -> Option<UploadJob> {
        self.shared.slot.lock().job.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UploadJob>> {
        self.shared.updates.subscribe()
    }

    /// Validates `selection` and, if it passes, replaces a successful job
    /// with a new pending one. A failed job must be discarded first.
    pub fn select_file(&self, selection: FileSelection) -> Result<UploadJob, UploadValidationError> {
        let job = {
            let mut slot = self.shared.slot.lock();
            let blocked = slot.job.as_ref().and_then(|job| match job.status() {
                status if status.is_in_flight() => Some(UploadValidationError::JobInFlight),
                UploadStatus::Error => Some(UploadValidationError::FailedJobNotDiscarded),
                _ => None,
            });

            let checked = match blocked {
                Some(e) => Err(e),
                None => self.validate(&selection),
            };
            checked.inspect_err(|e| {
                record_upload_job("rejected");
                tracing::debug!("Rejected {}: {}", selection.name, e);
            })?;

            let job = UploadJob::new(FileInfo {
                name: selection.name,
                byte_size: selection.bytes.len() as u64,
            });
            slot.job = Some(job.clone());
            slot.bytes = Some(selection.bytes);
            job
        };

        tracing::info!("Upload {} ready: {} ({} bytes)", job.id, job.file.name, job.file.byte_size);
        self.shared.publish(Some(job.clone()));
        Ok(job)
    }

    /// Uploads the pending job. Validation problems come back as `Err`;
    /// server-side outcomes (including failures) as `Ok`.
    pub async fn submit(&self) -> Result<UploadOutcome, UploadValidationError> {
        let (job_id, file_name, bytes) = {
            let mut slot = self.shared.slot.lock();
            let Some(job) = slot.job.as_mut() else {
                return Err(UploadValidationError::NothingToSubmit);
            };
            match job.status() {
                UploadStatus::Pending => {}
                UploadStatus::Uploading => return Err(UploadValidationError::JobInFlight),
                UploadStatus::Success | UploadStatus::Error => {
                    return Err(UploadValidationError::NothingToSubmit)
                }
            }
            if job.start_upload().is_err() {
                return Err(UploadValidationError::NothingToSubmit);
            }
            let (job_id, file_name) = (job.id, job.file.name.clone());
            let bytes = slot.bytes.take().unwrap_or_default();
            (job_id, file_name, bytes)
        };
        self.shared.publish(self.current());
        tracing::info!("Upload {} started", job_id);

        let mut guard = InFlightGuard {
            shared: self.shared.clone(),
            job_id,
            ticker: self.spawn_ticker(job_id),
            settled: false,
        };

        let response = self.uploader.upload(&file_name, bytes).await;
        guard.ticker.abort();
        guard.settled = true;

        let outcome = match response {
            Ok(result) => {
                let finished = self.shared.update_job(job_id, |job| {
                    if let Err(e) = job.succeed(result.clone()) {
                        tracing::debug!("Could not settle upload {}: {}", job_id, e);
                    }
                });
                match finished {
                    Some(job) => {
                        let partial_failure = result.has_failures().then(|| UploadResultPartialFailure {
                            failed: result.failed,
                            total: result.total,
                        });
                        record_upload_job(if partial_failure.is_some() { "partial" } else { "success" });
                        tracing::info!(
                            "Upload {} finished: {} created, {} updated, {} failed",
                            job_id,
                            result.created,
                            result.updated,
                            result.failed
                        );
                        if let Some(callback) = &self.on_complete {
                            callback(&result);
                        }
                        UploadOutcome::Success {
                            job,
                            partial_failure,
                        }
                    }
                    None => UploadOutcome::Discarded { job_id },
                }
            }
            Err(error) => {
                let finished = self.shared.update_job(job_id, |job| {
                    if let Err(e) = job.fail(error.message.clone()) {
                        tracing::debug!("Could not settle upload {}: {}", job_id, e);
                    }
                });
                match finished {
                    Some(job) => {
                        record_upload_job("error");
                        tracing::warn!("Upload {} failed: {}", job_id, error);
                        UploadOutcome::Failed { job, error }
                    }
                    None => UploadOutcome::Discarded { job_id },
                }
            }
        };

        if matches!(outcome, UploadOutcome::Discarded { .. }) {
            tracing::debug!("Upload {} was discarded before completion", job_id);
        }
        Ok(outcome)
    }

    /// Drops the current job in any state. A running transfer keeps going
    /// but its answer is ignored.
    pub fn discard(&self) -> Option<UploadJob> {
        let removed = {
            let mut slot = self.shared.slot.lock();
            slot.bytes = None;
            slot.job.take()
        };
        if let Some(job) = &removed {
            tracing::debug!("Discarded upload {} ({})", job.id, job.status().as_str());
            self.shared.publish(None);
        }
        removed
    }

    fn validate(&self, selection: &FileSelection) -> Result<(), UploadValidationError> {
        let expected = &self.settings.required_extension;
        let extension_ok = selection
            .name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(expected));
        if !extension_ok {
            return Err(UploadValidationError::WrongExtension {
                expected: expected.clone(),
            });
        }

        let size = selection.bytes.len() as u64;
        if size == 0 {
            return Err(UploadValidationError::Empty);
        }
        if size > self.settings.max_file_bytes {
            return Err(UploadValidationError::TooLarge {
                size,
                max_bytes: self.settings.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Simulated progress: the transfer itself reports nothing, so the bar
    /// creeps up to the ceiling and waits for the server.
    fn spawn_ticker(&self, job_id: Uuid) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let tick = self.settings.tick_interval;
        let step = self.settings.progress_step;
        let ceiling = self.settings.progress_ceiling;

        tokio::spawn(async move {
            loop {
                sleep(tick).await;
                let mut still_running = false;
                shared.update_job(job_id, |job| {
                    job.advance_progress(step, ceiling);
                    still_running = job.status() == UploadStatus::Uploading;
                });
                if !still_running {
                    break;
                }
            }
        })
    }
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("settings", &self.settings)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
