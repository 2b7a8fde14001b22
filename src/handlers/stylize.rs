use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::io::AsyncReadExt;

use crate::handlers::form::UploadForm;
use crate::models::error::AppError;
use crate::models::jobs::JobKind;
use crate::services::job_manager::JobGuard;
use crate::AppState;

const DEFAULT_STYLIZE_RATIO: f32 = 1.0;
const DEFAULT_COMBINE_RATIO: f32 = 0.5;
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// POST /stylize
// ---------------------------------------------------------------------------

pub async fn stylize(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let job = state.jobs.begin(JobKind::Stylize);
    let result = run_stylize(&state, &job, multipart).await;
    respond(job, result).await
}

async fn run_stylize(
    state: &AppState,
    job: &JobGuard,
    multipart: Multipart,
) -> Result<PathBuf, AppError> {
    let mut form = UploadForm::read(multipart, &["content", "style"], state.config.max_upload_bytes).await?;
    let (Some(content), Some(style)) = (form.take("content"), form.take("style")) else {
        return Err(AppError::ValidationError(
            "Please upload both content and style images.".to_string(),
        ));
    };
    let style_ratio = form.style_ratio(DEFAULT_STYLIZE_RATIO)?;

    let content_path = job.stage(&state.storage, content.file_name.as_deref(), &content.data).await?;
    let style_path = job.stage(&state.storage, style.file_name.as_deref(), &style.data).await?;
    let output_path = job.reserve_output(&state.storage);
    job.job().set_staged();

    compute(
        state,
        job,
        state
            .engine
            .stylize(&content_path, &style_path, &output_path, style_ratio),
    )
    .await?;
    Ok(output_path)
}

// ---------------------------------------------------------------------------
// POST /combine-styles
// ---------------------------------------------------------------------------

pub async fn combine_styles(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let job = state.jobs.begin(JobKind::CombineStyles);
    let result = run_combine(&state, &job, multipart).await;
    respond(job, result).await
}

async fn run_combine(
    state: &AppState,
    job: &JobGuard,
    multipart: Multipart,
) -> Result<PathBuf, AppError> {
    let mut form = UploadForm::read(
        multipart,
        &["content", "style1", "style2"],
        state.config.max_upload_bytes,
    )
    .await?;
    let (Some(content), Some(style1), Some(style2)) =
        (form.take("content"), form.take("style1"), form.take("style2"))
    else {
        return Err(AppError::ValidationError(
            "Please upload content and both style images.".to_string(),
        ));
    };
    let style_ratio = form.style_ratio(DEFAULT_COMBINE_RATIO)?;

    let content_path = job.stage(&state.storage, content.file_name.as_deref(), &content.data).await?;
    let style1_path = job.stage(&state.storage, style1.file_name.as_deref(), &style1.data).await?;
    let style2_path = job.stage(&state.storage, style2.file_name.as_deref(), &style2.data).await?;
    let output_path = job.reserve_output(&state.storage);
    job.job().set_staged();

    compute(
        state,
        job,
        state.engine.combine_styles(
            &content_path,
            &style1_path,
            &style2_path,
            &output_path,
            style_ratio,
        ),
    )
    .await?;
    Ok(output_path)
}

// ---------------------------------------------------------------------------
// Shared lifecycle steps
// ---------------------------------------------------------------------------

/// Runs the engine for a staged job, bounded by the configured timeout.
async fn compute(
    state: &AppState,
    job: &JobGuard,
    work: impl Future<Output = Result<(), AppError>>,
) -> Result<(), AppError> {
    job.job().set_computing();
    let timeout = state.config.compute_timeout();
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(AppError::ComputeTimeout(timeout.as_secs())),
    }
}

/// Streams the output on success. On any failure the guard is dropped here,
/// which deletes whatever the job staged.
async fn respond(job: JobGuard, result: Result<PathBuf, AppError>) -> Result<Response, AppError> {
    let outcome = match result {
        Ok(output) => open_output(&output).await.map(|opened| (output, opened)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((output, (file, len))) => {
            job.job().set_completed();
            tracing::info!(
                job_id = %job.id(),
                bytes = len,
                artifacts = job.job().artifacts().len(),
                "Job completed"
            );

            let filename = output
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("stylized.jpg")
                .to_string();
            let disposition = format!("attachment; filename=\"{}\"", filename);

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/jpeg".to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                stream_output(file, job),
            )
                .into_response())
        }
        Err(e) => {
            job.fail(&e);
            Err(e)
        }
    }
}

async fn open_output(output: &Path) -> Result<(tokio::fs::File, u64), AppError> {
    let file = tokio::fs::File::open(output).await.map_err(|e| {
        AppError::Io(format!("Failed to open output {}: {}", output.display(), e))
    })?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}

/// The guard lives inside the body stream, so cleanup runs once the body has
/// been fully sent or the connection drops.
fn stream_output(mut file: tokio::fs::File, job: JobGuard) -> Body {
    let stream = async_stream::stream! {
        let _job = job;
        let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<Bytes, std::io::Error>(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    tracing::error!(job_id = %_job.id(), error = %e, "Error sending file");
                    yield Err(e);
                    break;
                }
            }
        }
    };
    Body::from_stream(stream)
}
