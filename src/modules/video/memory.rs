use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::model::{NewVideo, Video, VideoStatus};
use super::repository::{RepositoryError, RepositoryResult, VideoRepository};

#[derive(Debug, Default)]
struct Inner {
    videos: Vec<Video>,
    last_created_at: Option<OffsetDateTime>,
    unavailable: bool,
}

/// Process-local metadata store for tests and local runs without Postgres.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVideoRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        self.lock().videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available(inner: &Inner) -> RepositoryResult<()> {
        if inner.unavailable {
            return Err(RepositoryError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn insert(&self, video: &NewVideo) -> RepositoryResult<Video> {
        let mut inner = self.lock();
        Self::available(&inner)?;

        // Inserts in the same clock tick still get strictly increasing timestamps.
        let now = OffsetDateTime::now_utc();
        let created_at = match inner.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_created_at = Some(created_at);

        let record = Video {
            id: video.id,
            title: video.title.clone(),
            source_key: video.source_key.clone(),
            status: VideoStatus::Queued,
            created_at,
        };
        inner.videos.push(record.clone());
        Ok(record)
    }

    async fn list_recent(&self) -> RepositoryResult<Vec<Video>> {
        let inner = self.lock();
        Self::available(&inner)?;

        let mut videos = inner.videos.clone();
        videos.sort_by_key(|v| Reverse((v.created_at, v.id)));
        Ok(videos)
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Video>> {
        let inner = self.lock();
        Self::available(&inner)?;
        Ok(inner.videos.iter().find(|v| v.id == id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: VideoStatus) -> RepositoryResult<()> {
        let mut inner = self.lock();
        Self::available(&inner)?;

        let video = inner
            .videos
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        video.status = status;
        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Self::available(&self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_video(title: &str) -> NewVideo {
        let id = Uuid::new_v4();
        NewVideo {
            id,
            title: title.to_string(),
            source_key: format!("source/{}/{}", id, title),
        }
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let repo = InMemoryVideoRepository::new();
        let a = repo.insert(&new_video("a.mp4")).await.unwrap();
        let b = repo.insert(&new_video("b.mp4")).await.unwrap();
        let c = repo.insert(&new_video("c.mp4")).await.unwrap();

        let ids: Vec<Uuid> = repo.list_recent().await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
        assert!(a.created_at < b.created_at && b.created_at < c.created_at);
    }

    #[tokio::test]
    async fn set_status_on_unknown_id_is_not_found() {
        let repo = InMemoryVideoRepository::new();
        let missing = Uuid::new_v4();

        let err = repo.set_status(missing, VideoStatus::Ready).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn outage_rejects_writes() {
        let repo = InMemoryVideoRepository::new();
        repo.set_unavailable(true);

        assert!(repo.insert(&new_video("a.mp4")).await.is_err());
        assert!(repo.ping().await.is_err());

        repo.set_unavailable(false);
        assert!(repo.is_empty());
        assert!(repo.ping().await.is_ok());
    }
}
