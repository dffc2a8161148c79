use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue and notifications
    pub redis_url: String,

    /// MongoDB connection string for the analysis document mirror
    pub mongodb_url: String,

    /// MongoDB database holding the mirror collection
    #[serde(default = "default_mongodb_database")]
    pub mongodb_database: String,

    /// Directory where uploaded videos are stored until analyzed
    #[serde(default = "default_video_storage_path")]
    pub video_storage_path: PathBuf,

    /// Directory for per-frame scratch images during extraction
    #[serde(default = "default_frame_scratch_path")]
    pub frame_scratch_path: PathBuf,

    /// Maximum number of analyses processed concurrently by a worker
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Accepted upload extensions, comma-separated (e.g., ".mp4,.avi")
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_mongodb_database() -> String {
    "video_qr_scan".to_string()
}

fn default_video_storage_path() -> PathBuf {
    PathBuf::from("./storage/videos")
}

fn default_frame_scratch_path() -> PathBuf {
    PathBuf::from("./storage/frames")
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_allowed_extensions() -> Vec<String> {
    [".mp4", ".avi", ".mkv", ".mov", ".webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
