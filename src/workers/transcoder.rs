use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::common::deadline::with_deadline;
use crate::config::settings::WorkerConfig;
use crate::infrastructure::queue::{ClaimedJob, JobQueue, QueueError};
use crate::infrastructure::storage::keys::{self, MANIFEST_NAME};
use crate::infrastructure::storage::ObjectStore;
use crate::modules::video::model::VideoStatus;
use crate::modules::video::repository::VideoRepository;
use crate::state::AppState;

/// One output object, named relative to `transcoded/{id}/`.
#[derive(Debug, Clone)]
pub struct TranscodedFile {
    pub name: String,
    pub data: Bytes,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Must return a file named `index.m3u8` among the outputs.
    async fn transcode(
        &self,
        video_id: Uuid,
        source_name: &str,
        source: Bytes,
    ) -> anyhow::Result<Vec<TranscodedFile>>;
}

/// Shells out to ffmpeg to cut a single-rendition HLS ladder.
pub struct FfmpegHlsTranscoder {
    ffmpeg_bin: String,
    segment_seconds: u32,
    work_root: PathBuf,
}

impl FfmpegHlsTranscoder {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            segment_seconds: config.hls_segment_seconds,
            work_root: std::env::temp_dir(),
        }
    }

    async fn run(&self, work_dir: &Path, source_name: &str, source: Bytes) -> anyhow::Result<Vec<TranscodedFile>> {
        let extension = Path::new(source_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let input = work_dir.join(format!("input.{}", extension));
        let out_dir = work_dir.join("out");

        tokio::fs::create_dir_all(&out_dir).await?;
        tokio::fs::write(&input, &source).await?;

        let output = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&input)
            .args(["-c:v", "libx264", "-preset", "fast", "-c:a", "aac"])
            .args(["-f", "hls", "-hls_playlist_type", "vod"])
            .arg("-hls_time")
            .arg(self.segment_seconds.to_string())
            .arg("-hls_segment_filename")
            .arg(out_dir.join("segment_%04d.ts"))
            .arg(out_dir.join(MANIFEST_NAME))
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.ffmpeg_bin))?;

        if !output.status.success() {
            bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            files.push(TranscodedFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                data: Bytes::from(tokio::fs::read(entry.path()).await?),
            });
        }

        Ok(files)
    }
}

#[async_trait]
impl Transcoder for FfmpegHlsTranscoder {
    async fn transcode(
        &self,
        video_id: Uuid,
        source_name: &str,
        source: Bytes,
    ) -> anyhow::Result<Vec<TranscodedFile>> {
        let work_dir = self.work_root.join(format!("vod-{}", video_id));
        let result = self.run(&work_dir, source_name, source).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(video_id = %video_id, error = %e, "Failed to clean up transcode directory");
        }

        result
    }
}

/// Consumes transcoding jobs and drives each video to `ready` or `failed`.
pub struct TranscodeWorker {
    storage: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoRepository>,
    jobs: Arc<dyn JobQueue>,
    transcoder: Arc<dyn Transcoder>,
    config: WorkerConfig,
    backend_timeout: Duration,
}

impl TranscodeWorker {
    pub fn new(state: &AppState, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            storage: state.storage.clone(),
            videos: state.videos.clone(),
            jobs: state.jobs.clone(),
            transcoder,
            config: state.config.worker.clone(),
            backend_timeout: state.config.backend_timeout,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting transcoder worker");

        loop {
            let handled = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_once() => result,
            };

            match handled {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Job queue error"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Transcoder worker stopped");
    }

    /// Handles at most one job. `Ok(false)` means nothing was visible in the queue.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(claimed) = self.jobs.claim(self.config.visibility_timeout).await? else {
            return Ok(false);
        };
        let video_id = claimed.job.video_id;
        info!(video_id = %video_id, attempt = claimed.attempt, "Received transcoding job");

        match self.process(&claimed).await {
            Ok(()) => {
                self.jobs.ack(&claimed).await?;
                info!(video_id = %video_id, "Transcoding finished");
            }
            Err(e) if claimed.attempt >= self.config.max_attempts => {
                error!(video_id = %video_id, attempt = claimed.attempt, error = %e, "Transcoding failed, giving up");
                if let Err(e) = self.bounded(self.videos.set_status(video_id, VideoStatus::Failed)).await {
                    warn!(video_id = %video_id, error = %e, "Could not mark video as failed");
                }
                self.jobs.ack(&claimed).await?;
            }
            Err(e) => {
                warn!(video_id = %video_id, attempt = claimed.attempt, error = %e, "Transcoding failed, releasing for retry");
                self.jobs.release(&claimed).await?;
            }
        }

        Ok(true)
    }

    async fn process(&self, claimed: &ClaimedJob) -> anyhow::Result<()> {
        let job = &claimed.job;
        let video_id = job.video_id;

        self.bounded(self.videos.set_status(video_id, VideoStatus::Processing))
            .await
            .context("failed to mark video as processing")?;

        let source_key = match &job.source_key {
            Some(key) => key.clone(),
            None => self
                .bounded(self.videos.find_by_id(video_id))
                .await
                .context("failed to look up source key")?
                .map(|video| video.source_key)
                .ok_or_else(|| anyhow!("no video record for {}", video_id))?,
        };

        let source = self
            .bounded(self.storage.get_object(&source_key))
            .await
            .context("failed to download source")?;
        let source_name = source_key.rsplit('/').next().unwrap_or(&source_key);

        let mut files = self.transcoder.transcode(video_id, source_name, source).await?;
        if !files.iter().any(|f| f.name == MANIFEST_NAME) {
            bail!("transcoder produced no {}", MANIFEST_NAME);
        }

        // The manifest is the readiness signal, so it goes up after every segment.
        files.sort_by_key(|f| f.name == MANIFEST_NAME);
        for file in files {
            let key = keys::transcoded_key(video_id, &file.name);
            let content_type = mime_guess::from_path(&file.name).first_or_octet_stream();
            self.bounded(self.storage.put_object(&key, file.data, content_type.as_ref()))
                .await
                .with_context(|| format!("failed to upload {}", key))?;
        }

        self.bounded(self.videos.set_status(video_id, VideoStatus::Ready))
            .await
            .context("failed to mark video as ready")?;

        Ok(())
    }

    async fn bounded<T, E, F>(&self, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Ok(with_deadline(self.backend_timeout, call).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::settings::AppConfig;
    use crate::infrastructure::queue::{ObjectStoreJobQueue, TranscodeJob};
    use crate::infrastructure::storage::InMemoryObjectStore;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::NewVideo;

    struct FakeTranscoder {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeTranscoder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, _id: Uuid, _name: &str, source: Bytes) -> anyhow::Result<Vec<TranscodedFile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("codec exploded");
            }
            Ok(vec![
                TranscodedFile {
                    name: MANIFEST_NAME.to_string(),
                    data: Bytes::from_static(b"#EXTM3U\n"),
                },
                TranscodedFile {
                    name: "segment_0000.ts".to_string(),
                    data: source,
                },
            ])
        }
    }

    struct Harness {
        state: AppState,
        store: InMemoryObjectStore,
        repo: InMemoryVideoRepository,
    }

    fn harness(max_attempts: u32) -> Harness {
        let store = InMemoryObjectStore::new();
        let repo = InMemoryVideoRepository::new();
        let storage: Arc<dyn ObjectStore> = Arc::new(store.clone());
        let mut config = AppConfig::default();
        config.worker.max_attempts = max_attempts;
        let state = AppState::new(
            config,
            storage.clone(),
            Arc::new(repo.clone()),
            Arc::new(ObjectStoreJobQueue::new(storage)),
        );
        Harness { state, store, repo }
    }

    async fn queue_video(h: &Harness) -> Uuid {
        let id = Uuid::new_v4();
        let source_key = keys::source_key(id, "clip.mp4");
        h.store
            .put_object(&source_key, Bytes::from_static(b"abc"), "video/mp4")
            .await
            .unwrap();
        h.repo
            .insert(&NewVideo {
                id,
                title: "clip.mp4".to_string(),
                source_key: source_key.clone(),
            })
            .await
            .unwrap();
        h.state.jobs.enqueue(&TranscodeJob::new(id, source_key)).await.unwrap();
        id
    }

    async fn status(h: &Harness, id: Uuid) -> VideoStatus {
        h.repo.find_by_id(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn empty_queue_reports_idle() {
        let h = harness(3);
        let worker = TranscodeWorker::new(&h.state, FakeTranscoder::new(false));

        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn successful_job_publishes_outputs_and_marks_ready() {
        let h = harness(3);
        let id = queue_video(&h).await;
        let worker = TranscodeWorker::new(&h.state, FakeTranscoder::new(false));

        assert!(worker.run_once().await.unwrap());

        assert_eq!(status(&h, id).await, VideoStatus::Ready);
        assert!(h.store.get(&keys::manifest_key(id)).is_some());
        assert_eq!(
            h.store.get(&keys::transcoded_key(id, "segment_0000.ts")).unwrap(),
            Bytes::from_static(b"abc")
        );
        assert!(h.store.get(&keys::job_key(id)).is_none());
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn failing_job_is_retried_then_marked_failed() {
        let h = harness(2);
        let id = queue_video(&h).await;
        let transcoder = FakeTranscoder::new(true);
        let worker = TranscodeWorker::new(&h.state, transcoder.clone());

        assert!(worker.run_once().await.unwrap());
        assert_eq!(status(&h, id).await, VideoStatus::Processing);
        assert!(h.store.get(&keys::job_key(id)).is_some());

        assert!(worker.run_once().await.unwrap());
        assert_eq!(status(&h, id).await, VideoStatus::Failed);
        assert!(h.store.get(&keys::job_key(id)).is_none());
        assert!(h.store.get(&keys::manifest_key(id)).is_none());

        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_source_counts_as_a_failed_attempt() {
        let h = harness(1);
        let id = queue_video(&h).await;
        h.store.delete_object(&keys::source_key(id, "clip.mp4")).await.unwrap();
        let transcoder = FakeTranscoder::new(false);
        let worker = TranscodeWorker::new(&h.state, transcoder.clone());

        assert!(worker.run_once().await.unwrap());

        assert_eq!(status(&h, id).await, VideoStatus::Failed);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bare_marker_resolves_source_from_record() {
        let h = harness(3);
        let id = queue_video(&h).await;
        h.store
            .put_object(&keys::job_key(id), Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        let worker = TranscodeWorker::new(&h.state, FakeTranscoder::new(false));

        assert!(worker.run_once().await.unwrap());

        assert_eq!(status(&h, id).await, VideoStatus::Ready);
        assert_eq!(
            h.store.get(&keys::transcoded_key(id, "segment_0000.ts")).unwrap(),
            Bytes::from_static(b"abc")
        );
        assert!(h.store.get(&keys::job_key(id)).is_none());
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let h = harness(3);
        let worker = TranscodeWorker::new(&h.state, FakeTranscoder::new(false));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown))
            .await
            .unwrap();
    }
}
