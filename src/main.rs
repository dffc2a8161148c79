use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use video_qr_scan::app_state::AppState;
use video_qr_scan::config::AppConfig;
use video_qr_scan::db::{self, documents::AnalysisDocumentStore};
use video_qr_scan::routes;
use video_qr_scan::services::queue::JobQueue;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing video-qr-scan server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("videos_uploaded_total", "Total video files accepted for analysis");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize MongoDB document mirror
    tracing::info!("Connecting to MongoDB document mirror");
    let documents = AnalysisDocumentStore::connect(&config.mongodb_url, &config.mongodb_database)
        .await
        .expect("Failed to connect to MongoDB");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Create shared application state
    let state = AppState::new(
        db_pool,
        documents,
        queue,
        config.video_storage_path.clone(),
        config.allowed_extensions.clone(),
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/v1/videos",
            post(routes::videos::upload_videos)
                .get(routes::videos::list_videos)
                .delete(routes::videos::purge_all),
        )
        .route("/v1/videos/{id}/status", get(routes::videos::get_status))
        .route(
            "/v1/videos/{id}/detections",
            get(routes::videos::get_detections),
        )
        .route(
            "/v1/videos/{id}/document",
            get(routes::videos::get_document),
        )
        .route("/v1/documents", get(routes::videos::list_documents))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(500 * 1024 * 1024)); // 500 MB limit for video uploads

    tracing::info!("Starting video-qr-scan on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
