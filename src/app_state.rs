use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::db::documents::AnalysisDocumentStore;
use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub documents: Arc<AnalysisDocumentStore>,
    pub queue: Arc<JobQueue>,
    pub video_storage_path: PathBuf,
    pub allowed_extensions: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        documents: AnalysisDocumentStore,
        queue: JobQueue,
        video_storage_path: PathBuf,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            db,
            documents: Arc::new(documents),
            queue: Arc::new(queue),
            video_storage_path,
            allowed_extensions: Arc::new(allowed_extensions),
        }
    }
}
