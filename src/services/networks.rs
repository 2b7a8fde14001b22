use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ndarray::{ArrayD, ArrayView4, ArrayViewD, IxDyn};
use parking_lot::Mutex;

use crate::models::config::AppConfig;
use crate::models::error::AppError;
use crate::services::model_registry::{ModelHandles, ModelLoader};

// ---------------------------------------------------------------------------
// Network seams
// ---------------------------------------------------------------------------

/// Style-prediction network: normalized NHWC image in, bottleneck out.
pub trait StyleNetwork: Send + Sync {
    fn predict(&self, image: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, AppError>;
}

/// Transformer network: content image plus bottleneck in, stylized NHWC image out.
pub trait TransformNetwork: Send + Sync {
    fn stylize(
        &self,
        content: ArrayView4<'_, f32>,
        bottleneck: ArrayViewD<'_, f32>,
    ) -> Result<ArrayD<f32>, AppError>;
}

// ---------------------------------------------------------------------------
// ONNX Runtime implementation
// ---------------------------------------------------------------------------

fn load_session(onnx_path: &Path, intra_threads: usize) -> Result<ort::session::Session, AppError> {
    if !onnx_path.exists() {
        return Err(AppError::ModelLoadError(format!(
            "Model file not found: {}",
            onnx_path.display()
        )));
    }
    ort::session::Session::builder()
        .and_then(|b| b.with_intra_threads(intra_threads))
        .and_then(|b| b.commit_from_file(onnx_path))
        .map_err(|e| {
            AppError::ModelLoadError(format!(
                "ONNX session load error for {}: {}",
                onnx_path.display(),
                e
            ))
        })
}

fn extract_tensor(value: &ort::value::DynValue) -> Result<ArrayD<f32>, AppError> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::InferenceError(format!("Failed to extract ONNX output: {}", e)))?;
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| AppError::InferenceError(format!("ONNX output shape mismatch: {}", e)))
}

fn to_input<D: ndarray::Dimension + 'static>(
    array: ndarray::ArrayView<'_, f32, D>,
) -> Result<ort::value::Tensor<f32>, AppError> {
    ort::value::Tensor::from_array(array.to_owned()).map_err(|e| {
        AppError::InferenceError(format!("Failed to create ONNX input tensor: {}", e))
    })
}

pub struct OnnxStyleNetwork {
    session: Mutex<ort::session::Session>,
}

impl OnnxStyleNetwork {
    pub fn load(onnx_path: &Path, intra_threads: usize) -> Result<Self, AppError> {
        Ok(Self {
            session: Mutex::new(load_session(onnx_path, intra_threads)?),
        })
    }
}

impl StyleNetwork for OnnxStyleNetwork {
    fn predict(&self, image: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, AppError> {
        let input = to_input(image)?;
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| AppError::InferenceError(format!("Style network failed: {}", e)))?;
        extract_tensor(&outputs[0])
    }
}

pub struct OnnxTransformNetwork {
    session: Mutex<ort::session::Session>,
}

impl OnnxTransformNetwork {
    pub fn load(onnx_path: &Path, intra_threads: usize) -> Result<Self, AppError> {
        Ok(Self {
            session: Mutex::new(load_session(onnx_path, intra_threads)?),
        })
    }
}

impl TransformNetwork for OnnxTransformNetwork {
    fn stylize(
        &self,
        content: ArrayView4<'_, f32>,
        bottleneck: ArrayViewD<'_, f32>,
    ) -> Result<ArrayD<f32>, AppError> {
        let content_input = to_input(content)?;
        let bottleneck_input = to_input(bottleneck)?;
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![content_input, bottleneck_input])
            .map_err(|e| AppError::InferenceError(format!("Transform network failed: {}", e)))?;
        extract_tensor(&outputs[0])
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads both networks from their ONNX files on the blocking pool.
pub struct OnnxModelLoader {
    style_path: PathBuf,
    transform_path: PathBuf,
    intra_threads: usize,
}

impl OnnxModelLoader {
    pub fn new(style_path: PathBuf, transform_path: PathBuf, intra_threads: usize) -> Self {
        Self {
            style_path,
            transform_path,
            intra_threads,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.style_model_path(),
            config.transform_model_path(),
            config.onnx_intra_threads,
        )
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<ModelHandles, AppError> {
        let style_path = self.style_path.clone();
        let transform_path = self.transform_path.clone();
        let intra_threads = self.intra_threads;

        tokio::task::spawn_blocking(move || -> Result<ModelHandles, AppError> {
            let style = OnnxStyleNetwork::load(&style_path, intra_threads)?;
            tracing::info!(path = %style_path.display(), "Loaded style network");
            let transform = OnnxTransformNetwork::load(&transform_path, intra_threads)?;
            tracing::info!(path = %transform_path.display(), "Loaded transform network");
            Ok(ModelHandles {
                style: Arc::new(style),
                transform: Arc::new(transform),
            })
        })
        .await
        .map_err(|e| AppError::ModelLoadError(format!("Model load task panicked: {}", e)))?
    }
}
