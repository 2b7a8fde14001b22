use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub allowed_origins: Vec<String>,
    pub upload_dir: String,
    pub output_dir: String,
    pub models_dir: String,
    pub style_model_file: String,
    pub transform_model_file: String,
    pub preload_models: bool,
    pub onnx_intra_threads: usize,
    pub max_upload_bytes: u64,
    pub cleanup_interval_secs: u64,
    pub compute_timeout_secs: u64,
    pub jpeg_quality: u8,
    pub style_image_size: u32,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            upload_dir: "./uploads".to_string(),
            output_dir: "./outputs".to_string(),
            models_dir: "./models".to_string(),
            style_model_file: "style_predict.onnx".to_string(),
            transform_model_file: "style_transform.onnx".to_string(),
            preload_models: false,
            onnx_intra_threads: 2,
            max_upload_bytes: 52_428_800,
            cleanup_interval_secs: 6 * 60 * 60,
            compute_timeout_secs: 300,
            jpeg_quality: 95,
            style_image_size: 256,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(d.listen_addr),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(d.allowed_origins),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(d.upload_dir),
            output_dir: env::var("OUTPUT_DIR").unwrap_or(d.output_dir),
            models_dir: env::var("MODELS_DIR").unwrap_or(d.models_dir),
            style_model_file: env::var("STYLE_MODEL_FILE").unwrap_or(d.style_model_file),
            transform_model_file: env::var("TRANSFORM_MODEL_FILE")
                .unwrap_or(d.transform_model_file),
            preload_models: env::var("PRELOAD_MODELS")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.preload_models),
            onnx_intra_threads: env::var("ONNX_INTRA_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.onnx_intra_threads),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.max_upload_bytes),
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.cleanup_interval_secs),
            compute_timeout_secs: env::var("COMPUTE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.compute_timeout_secs),
            jpeg_quality: env::var("JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|q: u8| q.clamp(1, 100))
                .unwrap_or(d.jpeg_quality),
            style_image_size: env::var("STYLE_IMAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.style_image_size),
            log_level: env::var("LOG_LEVEL").unwrap_or(d.log_level),
        }
    }

    pub fn style_model_path(&self) -> PathBuf {
        PathBuf::from(&self.models_dir).join(&self.style_model_file)
    }

    pub fn transform_model_path(&self) -> PathBuf {
        PathBuf::from(&self.models_dir).join(&self.transform_model_file)
    }

    /// `None` disables the periodic sweep.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }

    /// Edge length style images are resampled to, `None` when disabled.
    pub fn style_image_edge(&self) -> Option<u32> {
        (self.style_image_size > 0).then_some(self.style_image_size)
    }
}
