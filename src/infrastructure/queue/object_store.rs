use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ClaimedJob, JobQueue, QueueResult, TranscodeJob};
use crate::infrastructure::storage::keys::{self, JOBS_PREFIX};
use crate::infrastructure::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobLease {
    video_id: Uuid,
    attempt: u32,
    /// Unix milliseconds.
    expires_at: i64,
}

/// Job queue backed by trigger objects under `jobs/` and leases under `leases/`.
///
/// Lease writes are not conditional, so two consumers racing on the same job can
/// both win. That is within the at-least-once contract.
#[derive(Clone)]
pub struct ObjectStoreJobQueue {
    storage: Arc<dyn ObjectStore>,
}

impl ObjectStoreJobQueue {
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }

    async fn read_lease(&self, video_id: Uuid) -> QueueResult<Option<JobLease>> {
        match self.storage.get_object(&keys::lease_key(video_id)).await {
            Ok(bytes) => match serde_json::from_slice::<JobLease>(&bytes) {
                Ok(lease) => Ok(Some(lease)),
                Err(e) => {
                    // Unreadable lease: treat as expired so the job is not stuck forever.
                    warn!(video_id = %video_id, error = %e, "Discarding malformed job lease");
                    Ok(None)
                }
            },
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_lease(&self, lease: &JobLease) -> QueueResult<()> {
        let body = serde_json::to_vec(lease)?;
        self.storage
            .put_object(
                &keys::lease_key(lease.video_id),
                Bytes::from(body),
                mime::APPLICATION_JSON.as_ref(),
            )
            .await?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[async_trait]
impl JobQueue for ObjectStoreJobQueue {
    async fn enqueue(&self, job: &TranscodeJob) -> QueueResult<()> {
        let body = serde_json::to_vec(job)?;
        self.storage
            .put_object(
                &keys::job_key(job.video_id),
                Bytes::from(body),
                mime::APPLICATION_JSON.as_ref(),
            )
            .await?;
        Ok(())
    }

    async fn claim(&self, visibility_timeout: Duration) -> QueueResult<Option<ClaimedJob>> {
        let job_keys = self.storage.list_keys(JOBS_PREFIX).await?;

        for key in job_keys {
            let Some(video_id) = keys::video_id_from_job_key(&key) else {
                continue;
            };

            let now = now_millis();
            let lease = self.read_lease(video_id).await?;
            if lease.as_ref().is_some_and(|l| l.expires_at > now) {
                debug!(video_id = %video_id, "Job is leased, skipping");
                continue;
            }

            let payload = match self.storage.get_object(&key).await {
                Ok(bytes) => bytes,
                // Acknowledged by another consumer since the listing.
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let job = match serde_json::from_slice::<TranscodeJob>(&payload) {
                Ok(job) if job.video_id == video_id => job,
                Ok(_) => {
                    warn!(key = %key, "Job payload names another video, using the key");
                    TranscodeJob::marker(video_id)
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Job payload is a bare marker");
                    TranscodeJob::marker(video_id)
                }
            };

            let visibility = i64::try_from(visibility_timeout.as_millis()).unwrap_or(i64::MAX);
            let lease = JobLease {
                video_id,
                attempt: lease.map(|l| l.attempt).unwrap_or(0) + 1,
                expires_at: now.saturating_add(visibility),
            };
            self.write_lease(&lease).await?;

            return Ok(Some(ClaimedJob {
                job,
                attempt: lease.attempt,
            }));
        }

        Ok(None)
    }

    async fn ack(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let video_id = claimed.job.video_id;
        self.storage.delete_object(&keys::job_key(video_id)).await?;
        self.storage.delete_object(&keys::lease_key(video_id)).await?;
        Ok(())
    }

    async fn release(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        self.write_lease(&JobLease {
            video_id: claimed.job.video_id,
            attempt: claimed.attempt,
            expires_at: now_millis(),
        })
        .await
    }
}
