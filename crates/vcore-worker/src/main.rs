//! Video-processing worker process entry point: loads configuration,
//! constructs the storage gateway and media primitives, optionally
//! starts the read-only health HTTP surface, and runs the job
//! controller's claim loop until a shutdown signal arrives (§6).

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcore_media::{
    DctPerceptualHasher, FfmpegFrameExtractor, FfmpegSceneDetector, FfmpegTranscoder,
    OpenAiEmbedder, OpenAiTranscriber, OpenAiVisionCaptioner,
};
use vcore_storage::{JobSource, PgStorage, Storage};

use vcore_worker::pipeline::PipelineContext;
use vcore_worker::{JobController, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::new(log_level))
        .init();

    info!("starting vcore-worker");

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("invalid worker configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("worker exited with error: {}", e);
        std::process::exit(1);
    }

    info!("worker shutdown complete");
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let pool = vcore_storage::connect(&config.database_url).await?;
    let pg_storage = Arc::new(PgStorage::new(pool));
    let job_source: Arc<dyn JobSource> = pg_storage.clone();
    let storage: Arc<dyn Storage> = pg_storage.clone();

    let pipeline_ctx = Arc::new(PipelineContext {
        storage,
        transcoder: Arc::new(FfmpegTranscoder::new()),
        scene_detector: Arc::new(FfmpegSceneDetector::default()),
        frame_extractor: Arc::new(FfmpegFrameExtractor::new()),
        hasher: Arc::new(DctPerceptualHasher::default()),
        transcriber: Arc::new(OpenAiTranscriber::new(config.openai_api_key.clone())?),
        vision_captioner: Arc::new(OpenAiVisionCaptioner::new(config.openai_api_key.clone())?),
        embedder: Arc::new(OpenAiEmbedder::new(config.openai_api_key.clone())?),
        config: config.clone(),
    });

    let controller = JobController::new(
        job_source.clone(),
        pipeline_ctx,
        config.poll_interval,
        config.max_attempts,
        config.shutdown_timeout,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let http_handle = if config.dev_http {
        let state = vcore_worker::health::HealthState {
            job_source: job_source.clone(),
        };
        let metrics_handle = vcore_worker::metrics::install();
        let router = vcore_worker::health::router(state, Some(metrics_handle));
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
        info!(%addr, "starting health HTTP surface");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let mut shutdown_rx_http = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx_http.changed().await;
                })
                .await
        }))
    } else {
        None
    };

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.ok();
        };
        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT"),
            _ = terminate => info!("received SIGTERM"),
        }
        let _ = signal_tx.send(true);
    });

    controller.run(shutdown_rx).await;

    if let Some(handle) = http_handle {
        handle.abort();
    }

    Ok(())
}
