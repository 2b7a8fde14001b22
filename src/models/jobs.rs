use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Lifecycle of one style-transfer request.
///
/// `Received → Staged → Computing → Completed | Failed → Cleaned`. A request
/// rejected during validation goes straight from `Received` to `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Received,
    Staged,
    Computing,
    Completed,
    Failed,
    Cleaned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Stylize,
    CombineStyles,
}

impl JobKind {
    /// File name prefix for the job's output artifact.
    pub fn output_prefix(&self) -> &'static str {
        match self {
            JobKind::Stylize => "stylized",
            JobKind::CombineStyles => "combined_stylized",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct Job {
    pub info: parking_lot::RwLock<JobInfo>,
    artifacts: parking_lot::Mutex<Vec<PathBuf>>,
}

impl Job {
    pub fn new(kind: JobKind) -> (String, Arc<Self>) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let info = JobInfo {
            job_id: job_id.clone(),
            kind,
            status: JobStatus::Received,
            error: None,
            created_at: Utc::now().to_rfc3339(),
        };
        (job_id, Arc::new(Self {
            info: parking_lot::RwLock::new(info),
            artifacts: parking_lot::Mutex::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> String {
        self.info.read().job_id.clone()
    }

    pub fn kind(&self) -> JobKind {
        self.info.read().kind
    }

    pub fn status(&self) -> JobStatus {
        self.info.read().status
    }

    fn transition(&self, status: JobStatus) {
        let mut info = self.info.write();
        tracing::debug!(job_id = %info.job_id, from = ?info.status, to = ?status, "Job transition");
        info.status = status;
    }

    pub fn set_staged(&self) {
        self.transition(JobStatus::Staged);
    }

    pub fn set_computing(&self) {
        self.transition(JobStatus::Computing);
    }

    pub fn set_completed(&self) {
        self.transition(JobStatus::Completed);
    }

    pub fn set_failed(&self, error: String) {
        self.transition(JobStatus::Failed);
        self.info.write().error = Some(error);
    }

    pub fn set_cleaned(&self) {
        self.transition(JobStatus::Cleaned);
    }

    /// Records a file this job owns. It is deleted when the job is cleaned.
    pub fn add_artifact(&self, path: PathBuf) {
        self.artifacts.lock().push(path);
    }

    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.artifacts.lock().clone()
    }

    /// Hands over ownership of the artifact list; later calls return nothing.
    pub fn take_artifacts(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.artifacts.lock())
    }

    pub fn get_info(&self) -> JobInfo {
        self.info.read().clone()
    }
}
