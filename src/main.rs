use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stylize_server::handlers;
use stylize_server::models::config::AppConfig;
use stylize_server::services::networks::OnnxModelLoader;
use stylize_server::services::scheduler::spawn_cleanup_job;
use stylize_server::{build_router, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    handlers::health::init_start_time();

    let loader = Arc::new(OnnxModelLoader::from_config(&config));
    let state = build_state(config, loader).await?;
    let config = state.config.clone();

    match config.cleanup_interval() {
        Some(period) => {
            spawn_cleanup_job(state.storage.clone(), period);
        }
        None => tracing::warn!("CLEANUP_INTERVAL_SECS is 0; scheduled cleanup disabled"),
    }

    if config.preload_models {
        let preload_state = state.clone();
        tokio::spawn(async move {
            match preload_state.engine.registry().ensure_loaded().await {
                Ok(_) => tracing::info!("Models preloaded"),
                Err(e) => tracing::error!(error = %e, "Model preload failed; will retry on first request"),
            }
        });
    }

    let app = build_router(state);

    let addr = config.listen_addr.clone();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
