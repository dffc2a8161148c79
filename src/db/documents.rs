use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::{ProcessingStatus, QrDetection, VideoAnalysis};

const COLLECTION_NAME: &str = "video_analyses";

/// Denormalized analysis record as stored in MongoDB.
///
/// Ids are kept as hyphenated strings so the BSON mapping stays explicit.
/// Detections are embedded; every write replaces the whole document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub original_file_name: String,
    pub extension: String,
    pub status: ProcessingStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub qr_detections: Vec<DetectionDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDocument {
    pub id: String,
    pub content: String,
    pub start_seconds: i64,
    pub duration_seconds: i32,
}

impl From<&VideoAnalysis> for AnalysisDocument {
    fn from(analysis: &VideoAnalysis) -> Self {
        Self {
            id: analysis.id.to_string(),
            original_file_name: analysis.original_file_name.clone(),
            extension: analysis.extension.clone(),
            status: analysis.status,
            submitted_at: analysis.submitted_at,
            qr_detections: analysis
                .qr_detections
                .iter()
                .map(|d| DetectionDocument {
                    id: d.id.to_string(),
                    content: d.content.clone(),
                    start_seconds: d.start_seconds,
                    duration_seconds: d.duration_seconds,
                })
                .collect(),
        }
    }
}

impl AnalysisDocument {
    fn into_analysis(self) -> Result<VideoAnalysis, DocumentError> {
        let analysis_id = Uuid::parse_str(&self.id).map_err(DocumentError::InvalidId)?;
        let qr_detections = self
            .qr_detections
            .into_iter()
            .map(|d| {
                Ok(QrDetection {
                    id: Uuid::parse_str(&d.id).map_err(DocumentError::InvalidId)?,
                    analysis_id,
                    content: d.content,
                    start_seconds: d.start_seconds,
                    duration_seconds: d.duration_seconds,
                })
            })
            .collect::<Result<Vec<_>, DocumentError>>()?;

        Ok(VideoAnalysis {
            id: analysis_id,
            original_file_name: self.original_file_name,
            extension: self.extension,
            status: self.status,
            submitted_at: self.submitted_at,
            qr_detections,
        })
    }
}

/// Read-optimized mirror of analysis records in MongoDB.
pub struct AnalysisDocumentStore {
    database: Database,
    collection: Collection<AnalysisDocument>,
}

impl AnalysisDocumentStore {
    pub async fn connect(url: &str, database_name: &str) -> Result<Self, DocumentError> {
        let client = Client::with_uri_str(url).await.map_err(DocumentError::Mongo)?;
        let database = client.database(database_name);
        let collection = database.collection::<AnalysisDocument>(COLLECTION_NAME);
        Ok(Self { database, collection })
    }

    /// Insert the initial document (upload path).
    pub async fn create(&self, analysis: &VideoAnalysis) -> Result<(), DocumentError> {
        self.collection
            .insert_one(AnalysisDocument::from(analysis))
            .await
            .map_err(DocumentError::Mongo)?;
        Ok(())
    }

    /// Fetch one mirrored analysis with its embedded detections.
    pub async fn get(&self, id: Uuid) -> Result<Option<VideoAnalysis>, DocumentError> {
        let document = self
            .collection
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(DocumentError::Mongo)?;

        document.map(AnalysisDocument::into_analysis).transpose()
    }

    /// Replace the whole document with the current in-memory record.
    ///
    /// Upserts so a mirror document lost to a partial failure is recreated on
    /// the next status transition.
    pub async fn replace(&self, analysis: &VideoAnalysis) -> Result<(), DocumentError> {
        self.collection
            .replace_one(
                doc! { "_id": analysis.id.to_string() },
                AnalysisDocument::from(analysis),
            )
            .upsert(true)
            .await
            .map_err(DocumentError::Mongo)?;
        Ok(())
    }

    /// List all mirrored analyses.
    pub async fn list(&self) -> Result<Vec<VideoAnalysis>, DocumentError> {
        let mut cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(DocumentError::Mongo)?;

        let mut analyses = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(DocumentError::Mongo)? {
            analyses.push(document.into_analysis()?);
        }
        Ok(analyses)
    }

    /// Administrative bulk purge of the mirror collection.
    pub async fn delete_all(&self) -> Result<u64, DocumentError> {
        let result = self
            .collection
            .delete_many(doc! {})
            .await
            .map_err(DocumentError::Mongo)?;
        Ok(result.deleted_count)
    }

    /// Check MongoDB connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), DocumentError> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(DocumentError::Mongo)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Stored document id is not a UUID: {0}")]
    InvalidId(#[from] uuid::Error),
}
