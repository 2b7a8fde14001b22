use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::models::error::AppError;
use crate::AppState;

/// Sweeps both transient areas on demand.
pub async fn cleanup(State(state): State<Arc<AppState>>) -> Result<(StatusCode, &'static str), AppError> {
    let report = state.storage.sweep().await.into_result()?;
    tracing::info!(removed = report.removed(), "Manual cleanup completed");
    Ok((StatusCode::OK, "Cleanup completed successfully"))
}
