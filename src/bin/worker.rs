use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use video_qr_scan::config::AppConfig;
use video_qr_scan::db::{self, documents::AnalysisDocumentStore};
use video_qr_scan::services::frames::FfmpegFrameSampler;
use video_qr_scan::services::notify::NotificationChannel;
use video_qr_scan::services::processor::{JobProcessor, PgAnalysisStore};
use video_qr_scan::services::qr::RqrrDecoder;
use video_qr_scan::services::queue::JobQueue;
use video_qr_scan::services::timeline::QrTimelineExtractor;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting video analysis worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let documents = AnalysisDocumentStore::connect(&config.mongodb_url, &config.mongodb_database)
        .await
        .expect("Failed to connect to MongoDB");

    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));

    let notifications =
        NotificationChannel::new(&config.redis_url).expect("Failed to initialize notifications");

    let extractor = QrTimelineExtractor::new(
        FfmpegFrameSampler::new(),
        RqrrDecoder,
        config.frame_scratch_path.clone(),
    );

    let processor = Arc::new(JobProcessor::new(
        PgAnalysisStore::new(db_pool),
        documents,
        notifications,
        extractor,
    ));

    let semaphore = Arc::new(Semaphore::new(config.worker_concurrency));

    // Cooperative shutdown: stop dequeuing on SIGINT, let in-flight jobs finish.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, starting job processing loop"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::info!("Shutdown signal received, stopping consumer loop");
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => {
                let Ok(permit) = permit else { break };

                match queue.dequeue().await {
                    Ok(Some(delivery)) => {
                        let queue = Arc::clone(&queue);
                        let processor = Arc::clone(&processor);

                        // One task per delivery; the ack happens inside the
                        // task so no message blocks another's acknowledgment.
                        tokio::spawn(async move {
                            let _permit = permit;
                            let outcome = processor.process(delivery.payload()).await;
                            tracing::debug!(?outcome, "analysis job finished");

                            if let Err(e) = queue.ack(&delivery).await {
                                tracing::error!(error = %e, "failed to acknowledge delivery");
                            }
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        tracing::trace!("No jobs available, sleeping");
                        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::error!(error = %e, "Error polling job queue, will retry");
                        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                    }
                }
            }
        }
    }

    // Wait for in-flight analyses to complete before exiting.
    tracing::info!("Waiting for in-flight analyses to complete");
    let _ = semaphore
        .acquire_many(config.worker_concurrency as u32)
        .await;

    tracing::info!("Worker shutdown complete");
}
