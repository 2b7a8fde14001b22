use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::error::AppError;

/// Scratch areas for uploaded inputs and computed outputs.
///
/// Nothing here is durable. Files are named uniquely per request so
/// concurrent writers never collide; no locking is done.
pub struct TransientStorage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSweep {
    pub dir: PathBuf,
    pub removed: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub areas: Vec<AreaSweep>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.areas.iter().map(|a| a.removed).sum()
    }

    pub fn failed(&self) -> usize {
        self.areas.iter().map(|a| a.failures.len()).sum()
    }

    pub fn into_result(self) -> Result<Self, AppError> {
        if self.failed() == 0 {
            return Ok(self);
        }
        let detail = self
            .areas
            .iter()
            .flat_map(|a| a.failures.iter().cloned())
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::CleanupError(detail))
    }
}

impl TransientStorage {
    pub async fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let upload_dir = upload_dir.into();
        let output_dir = output_dir.into();
        fs::create_dir_all(&upload_dir).await?;
        fs::create_dir_all(&output_dir).await?;

        Ok(Self {
            upload_dir,
            output_dir,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes an uploaded part under a fresh UUID name, keeping a sane extension.
    pub async fn stage_upload(&self, filename: Option<&str>, data: &[u8]) -> Result<PathBuf, AppError> {
        let ext = filename
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let path = self.upload_dir.join(&stored_name);

        fs::write(&path, data).await.map_err(|e| {
            AppError::Io(format!("Failed to stage upload: {}", e))
        })?;

        debug!(path = %path.display(), size = data.len(), "Upload staged");
        Ok(path)
    }

    /// Time-based unique output path, e.g. `stylized_1718000000000_1a2b3c4d.jpg`.
    pub fn output_path(&self, prefix: &str) -> PathBuf {
        let millis = Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.output_dir
            .join(format!("{}_{}_{}.jpg", prefix, millis, &suffix[..8]))
    }

    /// Deletes every file in both areas, in-flight or not.
    ///
    /// A request whose computation straddles a sweep can lose its staged
    /// inputs and fail. Missing or empty areas are not errors.
    pub async fn sweep(&self) -> SweepReport {
        let mut areas = Vec::with_capacity(2);
        for dir in [&self.upload_dir, &self.output_dir] {
            let area = sweep_dir(dir).await;
            if area.failures.is_empty() {
                info!(dir = %dir.display(), removed = area.removed, "Cleaned up transient files");
            } else {
                warn!(
                    dir = %dir.display(),
                    removed = area.removed,
                    failed = area.failures.len(),
                    "Cleanup left files behind"
                );
            }
            areas.push(area);
        }
        SweepReport { areas }
    }
}

async fn sweep_dir(dir: &Path) -> AreaSweep {
    let mut area = AreaSweep {
        dir: dir.to_path_buf(),
        removed: 0,
        failures: Vec::new(),
    };

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return area,
        Err(e) => {
            area.failures.push(format!("{}: {}", dir.display(), e));
            return area;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                area.failures.push(format!("{}: {}", dir.display(), e));
                break;
            }
        };
        let path = entry.path();
        match entry.file_type().await {
            Ok(t) if t.is_dir() => {
                debug!(path = %path.display(), "Skipping directory during sweep");
                continue;
            }
            _ => {}
        }
        match remove_artifact(&path).await {
            Ok(true) => area.removed += 1,
            Ok(false) => {}
            Err(e) => area.failures.push(format!("{}: {}", path.display(), e)),
        }
    }
    area
}

/// Deletes one transient file. `Ok(false)` when it was already gone.
pub async fn remove_artifact(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
