use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::analysis::ProcessingStatus;

const NOTIFICATION_CHANNEL: &str = "video_scan:notifications";

/// Status change pushed to live listeners.
///
/// Wire shape is fixed: `{"analysisId": "<uuid>", "status": "<display name>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
    pub analysis_id: Uuid,
    pub status: ProcessingStatus,
}

/// Fire-and-forget pub/sub channel for analysis status changes.
pub struct NotificationChannel {
    client: redis::Client,
}

impl NotificationChannel {
    pub fn new(redis_url: &str) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url).map_err(NotifyError::Redis)?;
        Ok(Self { client })
    }

    /// Publish a status change. Callers treat failures as non-fatal.
    pub async fn publish(
        &self,
        analysis_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<(), NotifyError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(NotifyError::Redis)?;
        let payload = serde_json::to_string(&StatusNotification { analysis_id, status })
            .map_err(NotifyError::Serialize)?;

        debug!(%analysis_id, status = %status, "publishing status notification");
        conn.publish::<_, _, ()>(NOTIFICATION_CHANNEL, payload)
            .await
            .map_err(NotifyError::Redis)?;
        Ok(())
    }

    /// Subscribe to status notifications.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = StatusNotification> + Send>>, NotifyError>
    {
        use futures::StreamExt;

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(NotifyError::Redis)?;
        pubsub
            .subscribe(NOTIFICATION_CHANNEL)
            .await
            .map_err(NotifyError::Redis)?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
