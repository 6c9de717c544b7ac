use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vod_api::app;
use vod_api::config::settings::AppConfig;
use vod_api::infrastructure::db::pool::{connect_to_db, ensure_schema};
use vod_api::infrastructure::queue::ObjectStoreJobQueue;
use vod_api::infrastructure::storage::{ObjectStore, StorageService};
use vod_api::modules::video::repository::PgVideoRepository;
use vod_api::state::AppState;
use vod_api::workers::transcoder::{FfmpegHlsTranscoder, TranscodeWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vod_api=info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("invalid configuration")?;

    let pool = connect_to_db(&config.database_url, config.backend_timeout)
        .await
        .context("failed to connect to PostgreSQL")?;
    ensure_schema(&pool).await.context("failed to create schema")?;

    let storage: Arc<dyn ObjectStore> = Arc::new(StorageService::new(&config));
    let state = AppState::new(
        config.clone(),
        storage.clone(),
        Arc::new(PgVideoRepository::new(pool)),
        Arc::new(ObjectStoreJobQueue::new(storage)),
    );

    let shutdown = CancellationToken::new();

    let worker = if config.worker.enabled {
        let transcoder = Arc::new(FfmpegHlsTranscoder::new(&config.worker));
        let worker = TranscodeWorker::new(&state, transcoder);
        Some(tokio::spawn(worker.run(shutdown.clone())))
    } else {
        None
    };

    let app = app::create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Some(worker) = worker {
        worker.await.context("transcoder worker panicked")?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
