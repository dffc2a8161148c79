use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue message produced once per accepted upload.
///
/// Wire shape is fixed: `{"id": "<uuid>", "fileName": "...", "path": "..."}`.
/// Delivery may repeat; the consumer overwrites rather than deduplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: Uuid,
    pub file_name: String,
    pub path: String,
}
