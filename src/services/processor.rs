use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::documents::AnalysisDocumentStore;
use crate::db::queries;
use crate::models::analysis::{ProcessingStatus, QrDetection, VideoAnalysis};
use crate::models::job::AnalysisJob;
use crate::services::notify::NotificationChannel;
use crate::services::timeline::VideoScanner;

/// Authoritative store for analysis records and their detection rows.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn fetch(&self, id: Uuid) -> Result<Option<VideoAnalysis>, ProcessorError>;
    async fn update_status(&self, analysis: &VideoAnalysis) -> Result<(), ProcessorError>;
    async fn insert_detections(&self, rows: &[QrDetection]) -> Result<(), ProcessorError>;
}

/// Read-optimized secondary copy; every write replaces the whole document.
#[async_trait]
pub trait AnalysisMirror: Send + Sync {
    async fn upsert(&self, analysis: &VideoAnalysis) -> Result<(), ProcessorError>;
}

/// Fire-and-forget status change publisher.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(
        &self,
        analysis_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), ProcessorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("analysis store error: {0}")]
    Store(String),

    #[error("document store error: {0}")]
    Documents(String),

    #[error("notification error: {0}")]
    Notify(String),
}

/// Postgres-backed analysis store.
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn fetch(&self, id: Uuid) -> Result<Option<VideoAnalysis>, ProcessorError> {
        queries::get_analysis(&self.pool, id)
            .await
            .map_err(|e| ProcessorError::Store(e.to_string()))
    }

    async fn update_status(&self, analysis: &VideoAnalysis) -> Result<(), ProcessorError> {
        queries::update_status(&self.pool, analysis)
            .await
            .map_err(|e| ProcessorError::Store(e.to_string()))
    }

    async fn insert_detections(&self, rows: &[QrDetection]) -> Result<(), ProcessorError> {
        queries::insert_detections(&self.pool, rows)
            .await
            .map_err(|e| ProcessorError::Store(e.to_string()))
    }
}

#[async_trait]
impl AnalysisMirror for AnalysisDocumentStore {
    async fn upsert(&self, analysis: &VideoAnalysis) -> Result<(), ProcessorError> {
        self.replace(analysis)
            .await
            .map_err(|e| ProcessorError::Documents(e.to_string()))
    }
}

#[async_trait]
impl StatusPublisher for NotificationChannel {
    async fn publish_status(
        &self,
        analysis_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), ProcessorError> {
        self.publish(analysis_id, status)
            .await
            .map_err(|e| ProcessorError::Notify(e.to_string()))
    }
}

/// Result of handling one delivery. The handler itself never fails: every
/// path ends in exactly one acknowledgment by the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { detections: usize },
    Failed,
    Discarded,
    MissingRecord,
}

/// Drives one analysis job through its status state machine: lookup,
/// `Processing`, scan, persist detections, `Completed`; any unrecoverable
/// error after lookup lands in `Failed`. The relational store is
/// authoritative; mirror and notification writes are best-effort.
pub struct JobProcessor<S, M, P, V> {
    store: S,
    mirror: M,
    publisher: P,
    scanner: V,
}

impl<S, M, P, V> JobProcessor<S, M, P, V>
where
    S: AnalysisStore,
    M: AnalysisMirror,
    P: StatusPublisher,
    V: VideoScanner,
{
    pub fn new(store: S, mirror: M, publisher: P, scanner: V) -> Self {
        Self {
            store,
            mirror,
            publisher,
            scanner,
        }
    }

    /// Handle one raw delivery payload end to end.
    ///
    /// Never returns an error: malformed payloads are discarded, processing
    /// failures are converted into a `Failed` status, and the temporary
    /// source file is removed in all cases so the caller can always
    /// acknowledge the message.
    pub async fn process(&self, payload: &str) -> JobOutcome {
        let job: AnalysisJob = match serde_json::from_str(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "discarding malformed analysis job");
                return JobOutcome::Discarded;
            }
        };

        info!(analysis_id = %job.id, file_name = %job.file_name, "processing analysis job");

        let outcome = self.run(&job).await;
        self.remove_source_file(Path::new(&job.path)).await;
        outcome
    }

    async fn run(&self, job: &AnalysisJob) -> JobOutcome {
        let mut analysis = match self.store.fetch(job.id).await {
            Ok(Some(analysis)) => analysis,
            Ok(None) => {
                // Re-delivery cannot fix a record that was never created.
                error!(analysis_id = %job.id, "no analysis record for queued job, discarding");
                return JobOutcome::MissingRecord;
            }
            Err(e) => {
                error!(analysis_id = %job.id, error = %e, "analysis lookup failed");
                return JobOutcome::Failed;
            }
        };

        if let Err(e) = self.transition(&mut analysis, ProcessingStatus::Processing).await {
            error!(analysis_id = %analysis.id, error = %e, "failed to mark analysis as processing");
            self.fail(&mut analysis).await;
            return JobOutcome::Failed;
        }

        let intervals = match self.scanner.scan(Path::new(&job.path)).await {
            Ok(intervals) => intervals,
            Err(e) => {
                error!(analysis_id = %analysis.id, error = %e, "video scan failed");
                self.fail(&mut analysis).await;
                return JobOutcome::Failed;
            }
        };

        if !intervals.is_empty() {
            let rows: Vec<QrDetection> = intervals
                .iter()
                .map(|interval| QrDetection {
                    id: Uuid::new_v4(),
                    analysis_id: analysis.id,
                    content: interval.content.clone(),
                    start_seconds: interval.start_seconds as i64,
                    duration_seconds: interval.duration_seconds as i32,
                })
                .collect();

            if let Err(e) = self.store.insert_detections(&rows).await {
                error!(analysis_id = %analysis.id, error = %e, "failed to persist detections");
                self.fail(&mut analysis).await;
                return JobOutcome::Failed;
            }

            analysis.qr_detections = rows;
        }

        if let Err(e) = self.transition(&mut analysis, ProcessingStatus::Completed).await {
            error!(analysis_id = %analysis.id, error = %e, "failed to mark analysis as completed");
            self.fail(&mut analysis).await;
            return JobOutcome::Failed;
        }

        info!(
            analysis_id = %analysis.id,
            detections = analysis.qr_detections.len(),
            "analysis completed"
        );

        JobOutcome::Completed {
            detections: analysis.qr_detections.len(),
        }
    }

    /// Advance the state machine. The relational write decides success; the
    /// mirror and the notification only log their failures.
    async fn transition(
        &self,
        analysis: &mut VideoAnalysis,
        status: ProcessingStatus,
    ) -> Result<(), ProcessorError> {
        analysis.status = status;
        analysis.submitted_at = Utc::now();

        self.store.update_status(analysis).await?;
        self.mirror_and_notify(analysis).await;
        Ok(())
    }

    /// Best-effort `Failed` transition; every write failure is logged and
    /// swallowed so the delivery can still be acknowledged.
    async fn fail(&self, analysis: &mut VideoAnalysis) {
        analysis.status = ProcessingStatus::Failed;
        analysis.submitted_at = Utc::now();

        if let Err(e) = self.store.update_status(analysis).await {
            error!(analysis_id = %analysis.id, error = %e, "failed to persist failure status");
        }
        self.mirror_and_notify(analysis).await;
    }

    async fn mirror_and_notify(&self, analysis: &VideoAnalysis) {
        if let Err(e) = self.mirror.upsert(analysis).await {
            warn!(analysis_id = %analysis.id, error = %e, "document mirror write failed");
        }
        if let Err(e) = self
            .publisher
            .publish_status(analysis.id, analysis.status)
            .await
        {
            warn!(analysis_id = %analysis.id, error = %e, "status notification failed");
        }
    }

    async fn remove_source_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "deleted temporary source file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete source file"),
        }
    }
}
