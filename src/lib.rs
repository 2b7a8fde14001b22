pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use models::config::AppConfig;
use services::engine::{EngineOptions, StyleTransferEngine};
use services::job_manager::JobManager;
use services::model_registry::{ModelLoader, ModelRegistry};
use services::storage::TransientStorage;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<TransientStorage>,
    pub engine: StyleTransferEngine,
    pub jobs: JobManager,
}

/// Creates the transient areas and wires the engine to `loader`.
///
/// Models are not loaded here; the first request (or a preload) does that.
pub async fn build_state(config: AppConfig, loader: Arc<dyn ModelLoader>) -> anyhow::Result<Arc<AppState>> {
    let config = Arc::new(config);
    let storage = Arc::new(TransientStorage::new(&config.upload_dir, &config.output_dir).await?);
    let registry = Arc::new(ModelRegistry::new(loader));
    let engine = StyleTransferEngine::new(registry, EngineOptions::from_config(&config));

    Ok(Arc::new(AppState {
        config,
        storage,
        engine,
        jobs: JobManager::new(),
    }))
}

async fn request_id_middleware(request: Request<Body>, next: middleware::Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let allow_origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            header::CONTENT_DISPOSITION,
        ])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
            )
        })
        .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "response",
            );
        });

    Router::new()
        .route("/", get(handlers::health::index))
        .route("/stylize", post(handlers::stylize::stylize))
        .route("/combine-styles", post(handlers::stylize::combine_styles))
        .route("/cleanup", post(handlers::cleanup::cleanup))
        .route("/api/health", get(handlers::health::health_check))
        .route("/api/version", get(handlers::health::version))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes as usize))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors_layer(&state.config))
        .with_state(state)
}
