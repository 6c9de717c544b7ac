use futures_util::{stream, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dto::VideoResponse;
use super::model::NewVideo;
use crate::common::deadline::with_deadline;
use crate::common::error::AppError;
use crate::common::upload::UploadedFile;
use crate::infrastructure::queue::TranscodeJob;
use crate::infrastructure::storage::keys;
use crate::state::AppState;

const ACCEPTED_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".mkv"];

pub struct VideoService;

impl VideoService {
    pub fn validate_file_name(file_name: &str) -> Result<(), AppError> {
        let lower = file_name.to_ascii_lowercase();
        if ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            Ok(())
        } else {
            Err(AppError::InvalidInput("Only video files allowed".to_string()))
        }
    }

    /// Stores the upload, records it as `queued` and signals the transcoder.
    ///
    /// The three writes are not atomic. A failure stops the sequence at that step and
    /// leaves the earlier writes in place; a retry gets a fresh id.
    pub async fn submit(state: &AppState, upload: UploadedFile) -> Result<VideoResponse, AppError> {
        Self::validate_file_name(&upload.file_name)?;

        let limit = state.config.max_upload_bytes;
        if upload.data.len() > limit {
            return Err(AppError::PayloadTooLarge { limit });
        }

        let id = Uuid::new_v4();
        let source_key = keys::source_key(id, &upload.file_name);
        let content_type = upload.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&upload.file_name)
                .first_or_octet_stream()
                .to_string()
        });
        let size = upload.data.len();
        let timeout = state.config.backend_timeout;

        with_deadline(
            timeout,
            state.storage.put_object(&source_key, upload.data, &content_type),
        )
        .await
        .map_err(|e| {
            error!(video_id = %id, key = %source_key, error = %e, "Source upload failed");
            AppError::StorageWrite(e)
        })?;

        let new_video = NewVideo {
            id,
            title: upload.file_name,
            source_key: source_key.clone(),
        };
        let video = with_deadline(timeout, state.videos.insert(&new_video))
            .await
            .map_err(|e| {
                error!(video_id = %id, key = %source_key, error = %e, "Record insert failed, source blob is orphaned");
                AppError::RecordInsert(e)
            })?;

        let job = TranscodeJob::new(id, source_key);
        with_deadline(timeout, state.jobs.enqueue(&job))
            .await
            .map_err(|e| {
                error!(video_id = %id, error = %e, "Job signal failed, video stays queued without a worker");
                AppError::JobSignal(e)
            })?;

        info!(video_id = %id, title = %video.title, bytes = size, "Video queued for transcoding");

        Ok(VideoResponse::new(video, None))
    }

    /// Projects every record with an `hls_url` derived from what storage holds right now.
    pub async fn list(state: &AppState) -> Result<Vec<VideoResponse>, AppError> {
        let videos = with_deadline(state.config.backend_timeout, state.videos.list_recent())
            .await
            .map_err(AppError::RecordRead)?;

        let responses = stream::iter(videos)
            .map(|video| async move {
                let hls_url = Self::probe_manifest(state, video.id).await;
                VideoResponse::new(video, hls_url)
            })
            .buffered(state.config.list_probe_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(responses)
    }

    /// A failed probe reads as "not ready"; it only affects this one video.
    async fn probe_manifest(state: &AppState, id: Uuid) -> Option<String> {
        let key = keys::manifest_key(id);

        match with_deadline(state.config.backend_timeout, state.storage.head_object(&key)).await {
            Ok(Some(_)) => Some(hls_url(&state.config.cdn_base_url, id)),
            Ok(None) => {
                debug!(video_id = %id, key = %key, "Manifest not present");
                None
            }
            Err(e) => {
                warn!(video_id = %id, key = %key, error = %e, "Manifest probe failed, reporting not ready");
                None
            }
        }
    }
}

pub fn hls_url(cdn_base_url: &str, id: Uuid) -> String {
    format!("{}/hls/{}/{}", cdn_base_url, id, keys::MANIFEST_NAME)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::common::deadline::DeadlineError;
    use crate::config::settings::AppConfig;
    use crate::infrastructure::queue::{ClaimedJob, JobQueue, ObjectStoreJobQueue, QueueResult};
    use crate::infrastructure::storage::{InMemoryObjectStore, ObjectStore};
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::{Video, VideoStatus};
    use crate::modules::video::repository::{RepositoryResult, VideoRepository};

    /// Hangs on every insert, far past any backend timeout.
    struct StalledInsertRepository;

    #[async_trait]
    impl VideoRepository for StalledInsertRepository {
        async fn insert(&self, _video: &NewVideo) -> RepositoryResult<Video> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("insert should have been cancelled")
        }

        async fn list_recent(&self) -> RepositoryResult<Vec<Video>> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, _id: Uuid) -> RepositoryResult<Option<Video>> {
            Ok(None)
        }

        async fn set_status(&self, _id: Uuid, _status: VideoStatus) -> RepositoryResult<()> {
            Ok(())
        }

        async fn ping(&self) -> RepositoryResult<()> {
            Ok(())
        }
    }

    /// Hangs on every enqueue.
    struct StalledQueue;

    #[async_trait]
    impl JobQueue for StalledQueue {
        async fn enqueue(&self, _job: &TranscodeJob) -> QueueResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("enqueue should have been cancelled")
        }

        async fn claim(&self, _visibility_timeout: Duration) -> QueueResult<Option<ClaimedJob>> {
            Ok(None)
        }

        async fn ack(&self, _claimed: &ClaimedJob) -> QueueResult<()> {
            Ok(())
        }

        async fn release(&self, _claimed: &ClaimedJob) -> QueueResult<()> {
            Ok(())
        }
    }

    fn short_timeout_config() -> AppConfig {
        AppConfig {
            backend_timeout: Duration::from_secs(2),
            ..AppConfig::default()
        }
    }

    struct Harness {
        state: AppState,
        store: InMemoryObjectStore,
        repo: InMemoryVideoRepository,
    }

    fn harness() -> Harness {
        let store = InMemoryObjectStore::new();
        let repo = InMemoryVideoRepository::new();
        let storage = Arc::new(store.clone());
        let state = AppState::new(
            AppConfig::default(),
            storage.clone(),
            Arc::new(repo.clone()),
            Arc::new(ObjectStoreJobQueue::new(storage)),
        );
        Harness { state, store, repo }
    }

    fn upload(name: &str, body: &'static [u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: Some("video/mp4".to_string()),
            data: Bytes::from_static(body),
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        for ok in ["clip.mp4", "CLIP.MOV", "a.b.Mkv"] {
            assert!(VideoService::validate_file_name(ok).is_ok(), "{}", ok);
        }
        for bad in ["clip.avi", "clip.mp4.exe", "mp4", "clip"] {
            assert!(VideoService::validate_file_name(bad).is_err(), "{}", bad);
        }
    }

    #[tokio::test]
    async fn submit_writes_blob_record_and_job() {
        let h = harness();

        let video = VideoService::submit(&h.state, upload("clip.mp4", b"abc")).await.unwrap();

        assert_eq!(video.title, "clip.mp4");
        assert_eq!(video.status, VideoStatus::Queued);
        assert!(video.hls_url.is_none());

        let source = keys::source_key(video.id, "clip.mp4");
        assert_eq!(h.store.get(&source).unwrap(), Bytes::from_static(b"abc"));
        assert!(h.store.get(&keys::job_key(video.id)).is_some());

        let record = h.repo.find_by_id(video.id).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Queued);
        assert_eq!(record.source_key, source);
    }

    #[tokio::test]
    async fn rejected_extension_has_no_side_effects() {
        let h = harness();

        let err = VideoService::submit(&h.state, upload("clip.avi", b"abc")).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(h.store.keys().is_empty());
        assert!(h.repo.is_empty());
    }

    #[tokio::test]
    async fn missing_content_type_is_guessed_from_extension() {
        let h = harness();
        let mut file = upload("clip.mov", b"abc");
        file.content_type = None;

        let video = VideoService::submit(&h.state, file).await.unwrap();

        assert_eq!(
            h.store.content_type(&keys::source_key(video.id, "clip.mov")).as_deref(),
            Some("video/quicktime")
        );
    }

    #[tokio::test]
    async fn blob_failure_aborts_before_record() {
        let h = harness();
        h.store.fail_writes_under(keys::SOURCE_PREFIX);

        let err = VideoService::submit(&h.state, upload("clip.mp4", b"abc")).await.unwrap_err();

        assert!(matches!(err, AppError::StorageWrite(_)));
        assert!(h.repo.is_empty());
        assert!(h.store.keys().is_empty());
    }

    #[tokio::test]
    async fn job_signal_failure_leaves_queued_record() {
        let h = harness();
        h.store.fail_writes_under(keys::JOBS_PREFIX);

        let err = VideoService::submit(&h.state, upload("clip.mp4", b"abc")).await.unwrap_err();

        assert!(matches!(err, AppError::JobSignal(_)));
        let videos = h.repo.list_recent().await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].status, VideoStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_insert_times_out_before_job_signal() {
        let store = InMemoryObjectStore::new();
        let storage = Arc::new(store.clone());
        let state = AppState::new(
            short_timeout_config(),
            storage.clone(),
            Arc::new(StalledInsertRepository),
            Arc::new(ObjectStoreJobQueue::new(storage)),
        );

        let err = VideoService::submit(&state, upload("clip.mp4", b"abc")).await.unwrap_err();

        assert!(matches!(err, AppError::RecordInsert(DeadlineError::TimedOut(_))));
        let stored = store.keys();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].starts_with(keys::SOURCE_PREFIX));
        assert_eq!(store.get(&stored[0]).unwrap(), Bytes::from_static(b"abc"));
        assert!(!stored.iter().any(|k| k.starts_with(keys::JOBS_PREFIX)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_enqueue_times_out_as_job_signal() {
        let store = InMemoryObjectStore::new();
        let repo = InMemoryVideoRepository::new();
        let state = AppState::new(
            short_timeout_config(),
            Arc::new(store.clone()),
            Arc::new(repo.clone()),
            Arc::new(StalledQueue),
        );

        let err = VideoService::submit(&state, upload("clip.mp4", b"abc")).await.unwrap_err();

        assert!(matches!(err, AppError::JobSignal(DeadlineError::TimedOut(_))));
        let videos = repo.list_recent().await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].status, VideoStatus::Queued);
        assert!(store.get(&videos[0].source_key).is_some());
        assert!(store.get(&keys::job_key(videos[0].id)).is_none());
    }

    #[tokio::test]
    async fn probe_failure_only_hides_that_url() {
        let h = harness();
        let a = VideoService::submit(&h.state, upload("a.mp4", b"a")).await.unwrap();
        let b = VideoService::submit(&h.state, upload("b.mp4", b"b")).await.unwrap();
        for id in [a.id, b.id] {
            h.store
                .put_object(&keys::manifest_key(id), Bytes::from_static(b"#EXTM3U"), "application/vnd.apple.mpegurl")
                .await
                .unwrap();
        }
        h.store.fail_reads_under(format!("{}{}", keys::TRANSCODED_PREFIX, a.id));

        let listed = VideoService::list(&h.state).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(
            listed[0].hls_url.as_deref(),
            Some(format!("http://localhost:8081/hls/{}/index.m3u8", b.id).as_str())
        );
        assert_eq!(listed[1].id, a.id);
        assert!(listed[1].hls_url.is_none());
    }

    #[tokio::test]
    async fn record_read_failure_is_surfaced() {
        let h = harness();
        h.repo.set_unavailable(true);

        let err = VideoService::list(&h.state).await.unwrap_err();
        assert!(matches!(err, AppError::RecordRead(_)));
    }
}
