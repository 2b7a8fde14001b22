use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::Level;

use crate::models::error::AppError;
use crate::models::jobs::{Job, JobKind, JobStatus};
use crate::services::storage::{remove_artifact, TransientStorage};

/// Registry of in-flight style-transfer requests.
pub struct JobManager {
    jobs: Arc<DashMap<String, Arc<Job>>>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Registers a new request. Dropping the returned guard cleans it up.
    pub fn begin(&self, kind: JobKind) -> JobGuard {
        let (job_id, job) = Job::new(kind);
        self.jobs.insert(job_id.clone(), job.clone());
        tracing::info!(job_id = %job_id, kind = ?kind, "Job received");
        JobGuard {
            job,
            jobs: self.jobs.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }
}

/// Owns one request's transient artifacts.
///
/// When dropped, on success after the response body is done and on failure
/// as soon as the handler returns, it deletes every artifact exactly once and
/// removes the job from the registry. Deletion errors are logged only.
pub struct JobGuard {
    job: Arc<Job>,
    jobs: Arc<DashMap<String, Arc<Job>>>,
}

impl JobGuard {
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn id(&self) -> String {
        self.job.id()
    }

    pub async fn stage(
        &self,
        storage: &TransientStorage,
        filename: Option<&str>,
        data: &[u8],
    ) -> Result<PathBuf, AppError> {
        let path = storage.stage_upload(filename, data).await?;
        self.job.add_artifact(path.clone());
        Ok(path)
    }

    /// Reserves the output path. It is owned by the job whether or not the
    /// engine ever writes it.
    pub fn reserve_output(&self, storage: &TransientStorage) -> PathBuf {
        let path = storage.output_path(self.job.kind().output_prefix());
        self.job.add_artifact(path.clone());
        path
    }

    /// Marks the job failed. Client errors are logged at debug level; the
    /// response path already reports them.
    pub fn fail(&self, error: &AppError) {
        let job_id = self.job.id();
        if failure_level(error) == Level::ERROR {
            tracing::error!(job_id = %job_id, error = %error, "Job failed");
        } else {
            tracing::debug!(job_id = %job_id, error = %error, "Job rejected");
        }
        self.job.set_failed(error.to_string());
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let status = self.job.status();
        if !matches!(status, JobStatus::Completed | JobStatus::Failed) {
            // Handler future dropped mid-flight, e.g. client disconnect.
            self.job.set_failed(format!("Request abandoned while {:?}", status));
        }

        let job = self.job.clone();
        let jobs = self.jobs.clone();
        let artifacts = job.take_artifacts();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for path in &artifacts {
                        if let Err(e) = remove_artifact(path).await {
                            tracing::warn!(job_id = %job.id(), path = %path.display(), error = %e, "Failed to delete artifact");
                        }
                    }
                    finish(&job, &jobs, artifacts.len());
                });
            }
            Err(_) => {
                for path in &artifacts {
                    match std::fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!(job_id = %job.id(), path = %path.display(), error = %e, "Failed to delete artifact");
                        }
                    }
                }
                finish(&job, &jobs, artifacts.len());
            }
        }
    }
}

fn failure_level(error: &AppError) -> Level {
    if error.status().is_client_error() {
        Level::DEBUG
    } else {
        Level::ERROR
    }
}

fn finish(job: &Job, jobs: &DashMap<String, Arc<Job>>, artifacts: usize) {
    job.set_cleaned();
    let job_id = job.id();
    jobs.remove(&job_id);
    tracing::info!(job_id = %job_id, artifacts, "Job cleaned");
}
