#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ndarray::{ArrayD, ArrayView4, ArrayViewD, Axis, IxDyn};

use stylize_server::models::config::AppConfig;
use stylize_server::models::error::AppError;
use stylize_server::services::model_registry::{ModelHandles, ModelLoader};
use stylize_server::services::networks::{StyleNetwork, TransformNetwork};
use stylize_server::{build_router, build_state, AppState};

/// Bottleneck is the per-channel mean of the image.
pub struct MeanStyle;

impl StyleNetwork for MeanStyle {
    fn predict(&self, image: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, AppError> {
        let means: Vec<f32> = (0..3)
            .map(|c| image.index_axis(Axis(3), c).mean().unwrap_or(0.0))
            .collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&[1, 1, 1, 3]), means).unwrap())
    }
}

/// Blends each pixel halfway towards the bottleneck colour.
pub struct TintTransform;

impl TransformNetwork for TintTransform {
    fn stylize(
        &self,
        content: ArrayView4<'_, f32>,
        bottleneck: ArrayViewD<'_, f32>,
    ) -> Result<ArrayD<f32>, AppError> {
        let tint: Vec<f32> = bottleneck.iter().copied().collect();
        let mut out = content.to_owned();
        for (c, mut channel) in out.axis_iter_mut(Axis(3)).enumerate() {
            let t = tint.get(c).copied().unwrap_or(0.0);
            channel.mapv_inplace(|v| (v + t) * 0.5);
        }
        Ok(out.into_dyn())
    }
}

/// Style network that blocks for `delay` before answering like [`MeanStyle`].
pub struct SleepyStyle(pub Duration);

impl StyleNetwork for SleepyStyle {
    fn predict(&self, image: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, AppError> {
        std::thread::sleep(self.0);
        MeanStyle.predict(image)
    }
}

/// Always hands out the same networks.
pub struct FixedLoader(pub ModelHandles);

#[async_trait]
impl ModelLoader for FixedLoader {
    async fn load(&self) -> Result<ModelHandles, AppError> {
        Ok(self.0.clone())
    }
}

impl FixedLoader {
    pub fn slow_style(delay: Duration) -> Self {
        Self(ModelHandles {
            style: Arc::new(SleepyStyle(delay)),
            transform: Arc::new(TintTransform),
        })
    }
}

/// Fails the first `failures` loads, then succeeds.
pub struct FlakyLoader {
    failures: u64,
    calls: AtomicU64,
}

impl FlakyLoader {
    pub fn reliable() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: u64) -> Self {
        Self {
            failures,
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ModelLoader for FlakyLoader {
    async fn load(&self) -> Result<ModelHandles, AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(AppError::ModelLoadError("weights unavailable".to_string()));
        }
        Ok(ModelHandles {
            style: Arc::new(MeanStyle),
            transform: Arc::new(TintTransform),
        })
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn upload_dir(&self) -> &Path {
        self.state.storage.upload_dir()
    }

    pub fn output_dir(&self) -> &Path {
        self.state.storage.output_dir()
    }
}

pub async fn spawn_server(loader: Arc<dyn ModelLoader>) -> TestServer {
    spawn_server_with(loader, |_| {}).await
}

/// Like [`spawn_server`], with `tweak` applied to the config first.
pub async fn spawn_server_with(
    loader: Arc<dyn ModelLoader>,
    tweak: impl FnOnce(&mut AppConfig),
) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig {
        upload_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
        output_dir: dir.path().join("outputs").to_string_lossy().into_owned(),
        style_image_size: 32,
        ..AppConfig::default()
    };
    tweak(&mut config);
    let state = build_state(config, loader).await.unwrap();
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        _dir: dir,
    }
}

pub fn jpeg(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

pub fn image_part(data: Vec<u8>, name: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(data)
        .file_name(name.to_string())
        .mime_str("image/jpeg")
        .unwrap()
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Polls until both transient areas are empty.
pub async fn wait_for_empty_storage(server: &TestServer) -> bool {
    for _ in 0..200 {
        if files_in(server.upload_dir()).is_empty() && files_in(server.output_dir()).is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
