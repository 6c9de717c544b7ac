//! Transcoding job queue.
//!
//! A job is pending while `jobs/{id}.json` exists, whatever its content. Consumers
//! claim a job by taking a lease with a visibility timeout, then either acknowledge it
//! (removing the trigger) or release it for redelivery. Delivery is at-least-once: a lease that expires
//! before the consumer acknowledges makes the job visible again.

pub mod object_store;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infrastructure::storage::StorageError;

pub use object_store::ObjectStoreJobQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("job payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Payload of a `jobs/{id}.json` trigger.
///
/// Only the video id, taken from the key, is required. Producers that write a bare
/// marker leave the rest empty and the consumer looks the source up by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub video_id: Uuid,
    #[serde(default)]
    pub source_key: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub enqueued_at: Option<i64>,
}

impl TranscodeJob {
    pub fn new(video_id: Uuid, source_key: impl Into<String>) -> Self {
        Self {
            video_id,
            source_key: Some(source_key.into()),
            enqueued_at: Some(OffsetDateTime::now_utc().unix_timestamp()),
        }
    }

    pub fn marker(video_id: Uuid) -> Self {
        Self {
            video_id,
            source_key: None,
            enqueued_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub job: TranscodeJob,
    /// 1 on first delivery.
    pub attempt: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &TranscodeJob) -> QueueResult<()>;

    /// Takes a visible job, hiding it from other consumers for `visibility_timeout`.
    async fn claim(&self, visibility_timeout: Duration) -> QueueResult<Option<ClaimedJob>>;

    async fn ack(&self, claimed: &ClaimedJob) -> QueueResult<()>;

    /// Makes the job visible again right away. The attempt count is kept.
    async fn release(&self, claimed: &ClaimedJob) -> QueueResult<()>;
}
