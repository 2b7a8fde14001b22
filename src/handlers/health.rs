use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::services::compute_scope::LedgerSnapshot;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime: f64,
    pub models_loaded: bool,
    pub in_flight_jobs: usize,
    pub compute_buffers: LedgerSnapshot,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

pub async fn index() -> &'static str {
    "Welcome to the Style Transfer API!"
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = START_TIME
        .get()
        .map(|s| s.elapsed().as_secs_f64())
        .unwrap_or(0.0);

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime,
        models_loaded: state.engine.registry().is_loaded(),
        in_flight_jobs: state.jobs.in_flight(),
        compute_buffers: state.engine.buffers(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub style_model: String,
    pub transform_model: String,
}

pub async fn version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        style_model: state.config.style_model_file.clone(),
        transform_model: state.config.transform_model_file.clone(),
    })
}
