use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::services::storage::TransientStorage;

/// Sweeps both transient areas every `period`, starting one period from now.
pub fn spawn_cleanup_job(storage: Arc<TransientStorage>, period: Duration) -> JoinHandle<()> {
    tracing::info!(period_secs = period.as_secs(), "Cleanup job scheduled");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tracing::info!("Running scheduled cleanup job");
            let report = storage.sweep().await;
            if report.failed() == 0 {
                tracing::info!(removed = report.removed(), "Scheduled cleanup completed");
            } else {
                tracing::warn!(
                    removed = report.removed(),
                    failed = report.failed(),
                    "Scheduled cleanup completed with errors"
                );
            }
        }
    })
}
