use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::model::{NewVideo, Video, VideoRow, VideoStatus};
use crate::infrastructure::db::pool::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("video {0} not found")]
    NotFound(Uuid),
    #[error("corrupt video row: {0}")]
    Corrupt(String),
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Inserts with status `queued`; `created_at` is assigned by the store.
    async fn insert(&self, video: &NewVideo) -> RepositoryResult<Video>;

    /// All videos, newest first, ties broken by id descending.
    async fn list_recent(&self) -> RepositoryResult<Vec<Video>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Video>>;

    async fn set_status(&self, id: Uuid, status: VideoStatus) -> RepositoryResult<()>;

    async fn ping(&self) -> RepositoryResult<()>;
}

#[derive(Clone)]
pub struct PgVideoRepository {
    pool: DbPool,
}

impl PgVideoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_video(row: VideoRow) -> RepositoryResult<Video> {
    Video::try_from(row).map_err(RepositoryError::Corrupt)
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn insert(&self, video: &NewVideo) -> RepositoryResult<Video> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            INSERT INTO videos (id, title, source_key, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, source_key, status, created_at
            "#,
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.source_key)
        .bind(VideoStatus::Queued.as_str())
        .fetch_one(&self.pool)
        .await?;

        into_video(row)
    }

    async fn list_recent(&self) -> RepositoryResult<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, title, source_key, status, created_at
            FROM videos
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_video).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>(
            "SELECT id, title, source_key, status, created_at FROM videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_video).transpose()
    }

    async fn set_status(&self, id: Uuid, status: VideoStatus) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE videos SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }

        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
