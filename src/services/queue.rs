use redis::AsyncCommands;

use crate::models::job::AnalysisJob;

const QUEUE_KEY: &str = "video_scan:jobs";
const PROCESSING_KEY: &str = "video_scan:processing";

/// One at-least-once delivery pulled from the queue.
///
/// Keeps the raw payload so a malformed message can still be acknowledged;
/// deserialization is the consumer's first step, not the queue's.
#[derive(Debug)]
pub struct Delivery {
    payload: String,
}

impl Delivery {
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Redis-backed async job queue with explicit acknowledgment.
///
/// Enqueue pushes onto the pending list; dequeue atomically moves the payload
/// to a processing list (the delivery), and `ack` removes it from there. A
/// payload left on the processing list by a crashed worker can be redelivered,
/// hence at-least-once.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue an analysis job.
    pub async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue the next delivery (pop with move to the processing list).
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        Ok(result.map(|payload| Delivery { payload }))
    }

    /// Acknowledge a delivery (remove from the processing list).
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
