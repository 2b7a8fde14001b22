use std::path::Path;
use std::sync::Arc;

use ndarray::Ix4;

use crate::models::config::AppConfig;
use crate::models::error::AppError;
use crate::services::blender;
use crate::services::compute_scope::{BufferLedger, ComputeScope, LedgerSnapshot, ScopedTensor};
use crate::services::model_registry::{ModelHandles, ModelRegistry};
use crate::services::tensor_io;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub jpeg_quality: u8,
    /// Style images are resampled to this square edge before the style network.
    pub style_image_edge: Option<u32>,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            style_image_edge: config.style_image_edge(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Runs style transfer between files in transient storage.
pub struct StyleTransferEngine {
    registry: Arc<ModelRegistry>,
    ledger: Arc<BufferLedger>,
    options: EngineOptions,
}

impl StyleTransferEngine {
    pub fn new(registry: Arc<ModelRegistry>, options: EngineOptions) -> Self {
        Self {
            registry,
            ledger: Arc::new(BufferLedger::new()),
            options,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Numeric buffers currently held by running computations.
    pub fn buffers(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Stylizes `content` with `style` and writes a JPEG to `output`.
    ///
    /// `style_ratio` weighs the style bottleneck against the content's own
    /// (identity) bottleneck: 1.0 is full style, 0.0 reproduces the content.
    pub async fn stylize(
        &self,
        content: &Path,
        style: &Path,
        output: &Path,
        style_ratio: f32,
    ) -> Result<(), AppError> {
        let models = self.registry.ensure_loaded().await?;
        let content_bytes = tensor_io::read_image_bytes(content).await?;
        let style_bytes = tensor_io::read_image_bytes(style).await?;

        let ledger = self.ledger.clone();
        let options = self.options.clone();
        let encoded = run_blocking(move || {
            stylize_tensors(&models, &ledger, &options, &content_bytes, &style_bytes, style_ratio)
        })
        .await?;

        write_output(output, &encoded).await
    }

    /// Stylizes `content` with a blend of two styles. `style_ratio` is the
    /// weight toward `style2`; 0.5 mixes both equally.
    pub async fn combine_styles(
        &self,
        content: &Path,
        style1: &Path,
        style2: &Path,
        output: &Path,
        style_ratio: f32,
    ) -> Result<(), AppError> {
        let models = self.registry.ensure_loaded().await?;
        let content_bytes = tensor_io::read_image_bytes(content).await?;
        let style1_bytes = tensor_io::read_image_bytes(style1).await?;
        let style2_bytes = tensor_io::read_image_bytes(style2).await?;

        let ledger = self.ledger.clone();
        let options = self.options.clone();
        let encoded = run_blocking(move || {
            combine_tensors(
                &models,
                &ledger,
                &options,
                &content_bytes,
                &style1_bytes,
                &style2_bytes,
                style_ratio,
            )
        })
        .await?;

        write_output(output, &encoded).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Compute task panicked: {}", e)))?
}

async fn write_output(output: &Path, data: &[u8]) -> Result<(), AppError> {
    tokio::fs::write(output, data).await.map_err(|e| {
        AppError::Io(format!("Failed to write output {}: {}", output.display(), e))
    })
}

fn prepare_content<'s>(
    scope: &'s ComputeScope<'_>,
    bytes: &[u8],
) -> Result<ScopedTensor<'s, f32, Ix4>, AppError> {
    let decoded = scope.adopt(tensor_io::decode(bytes)?);
    Ok(scope.adopt(tensor_io::normalize(decoded.view())))
}

fn prepare_style<'s>(
    scope: &'s ComputeScope<'_>,
    bytes: &[u8],
    options: &EngineOptions,
) -> Result<ScopedTensor<'s, f32, Ix4>, AppError> {
    let decoded = scope.adopt(tensor_io::decode(bytes)?);
    match options.style_image_edge {
        Some(edge) => {
            let resized = scope.adopt(tensor_io::resize_square(decoded.view(), edge)?);
            Ok(scope.adopt(tensor_io::normalize(resized.view())))
        }
        None => Ok(scope.adopt(tensor_io::normalize(decoded.view()))),
    }
}

fn stylize_tensors(
    models: &ModelHandles,
    ledger: &BufferLedger,
    options: &EngineOptions,
    content_bytes: &[u8],
    style_bytes: &[u8],
    style_ratio: f32,
) -> Result<Vec<u8>, AppError> {
    let scope = ComputeScope::new(ledger);
    let content = prepare_content(&scope, content_bytes)?;
    let style = prepare_style(&scope, style_bytes, options)?;

    let style_bottleneck = scope.adopt(models.style.predict(style.view())?);
    let bottleneck = if style_ratio != 1.0 {
        let identity = scope.adopt(models.style.predict(content.view())?);
        scope.adopt(blender::interpolate(identity.view(), style_bottleneck.view(), style_ratio)?)
    } else {
        style_bottleneck
    };

    let stylized = scope.adopt(models.transform.stylize(content.view(), bottleneck.view())?);
    let encoded = tensor_io::denormalize_and_encode(tensor_io::squeeze_batch(stylized.view()), options.jpeg_quality);
    tracing::debug!(tensors = scope.adopted(), style_ratio, "Stylize computation finished");
    encoded
}

fn combine_tensors(
    models: &ModelHandles,
    ledger: &BufferLedger,
    options: &EngineOptions,
    content_bytes: &[u8],
    style1_bytes: &[u8],
    style2_bytes: &[u8],
    style_ratio: f32,
) -> Result<Vec<u8>, AppError> {
    let scope = ComputeScope::new(ledger);
    let content = prepare_content(&scope, content_bytes)?;
    let style1 = prepare_style(&scope, style1_bytes, options)?;
    let style2 = prepare_style(&scope, style2_bytes, options)?;

    let bottleneck1 = scope.adopt(models.style.predict(style1.view())?);
    let bottleneck2 = scope.adopt(models.style.predict(style2.view())?);
    let combined = scope.adopt(blender::interpolate(
        bottleneck1.view(),
        bottleneck2.view(),
        style_ratio,
    )?);

    let stylized = scope.adopt(models.transform.stylize(content.view(), combined.view())?);
    let encoded = tensor_io::denormalize_and_encode(tensor_io::squeeze_batch(stylized.view()), options.jpeg_quality);
    tracing::debug!(tensors = scope.adopted(), style_ratio, "Combine computation finished");
    encoded
}
