use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Processing status of a video analysis.
///
/// The display names double as the stored column value and the notification
/// payload value: `InQueue`, `Processing`, `Completed`, `Failed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ProcessingStatus {
    InQueue,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// `Completed` and `Failed` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

/// One contiguous interval during which a single QR payload was visible.
///
/// Stored as flat rows in Postgres and as the nested list on the mirrored
/// document. `start_seconds` is the offset from the start of the video;
/// `duration_seconds` counts the consecutive one-second samples that decoded
/// to the same content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrDetection {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub content: String,
    pub start_seconds: i64,
    pub duration_seconds: i32,
}

/// A video analysis record.
///
/// The relational store persists the scalar fields plus flat `QrDetection`
/// rows; the document store persists the whole record with `qr_detections`
/// embedded. Owned exclusively by the worker while processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysis {
    pub id: Uuid,
    pub original_file_name: String,
    pub extension: String,
    pub status: ProcessingStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub qr_detections: Vec<QrDetection>,
}

impl VideoAnalysis {
    /// Create a fresh record in `InQueue`, as the upload path does before
    /// enqueueing the job.
    pub fn new(original_file_name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_file_name: original_file_name.into(),
            extension: extension.into(),
            status: ProcessingStatus::InQueue,
            submitted_at: Utc::now(),
            qr_detections: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_names_are_canonical() {
        assert_eq!(ProcessingStatus::InQueue.to_string(), "InQueue");
        assert_eq!(ProcessingStatus::Processing.to_string(), "Processing");
        assert_eq!(ProcessingStatus::Completed.to_string(), "Completed");
        assert_eq!(ProcessingStatus::Failed.to_string(), "Failed");
    }

    #[test]
    fn status_round_trips_through_stored_text() {
        for status in [
            ProcessingStatus::InQueue,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            let parsed: ProcessingStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!ProcessingStatus::InQueue.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
    }

    #[test]
    fn analysis_starts_in_queue_with_no_detections() {
        let analysis = VideoAnalysis::new("clip.mp4", ".mp4");
        assert_eq!(analysis.status, ProcessingStatus::InQueue);
        assert!(analysis.qr_detections.is_empty());
    }

    #[test]
    fn status_serializes_as_display_name() {
        let json = serde_json::to_string(&ProcessingStatus::InQueue).unwrap();
        assert_eq!(json, "\"InQueue\"");
    }
}
