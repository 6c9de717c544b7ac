use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{Video, VideoStatus};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VideoResponse {
    pub id: Uuid,
    pub title: String,
    pub status: VideoStatus,
    /// Present once the transcoded manifest exists in storage.
    pub hls_url: Option<String>,
}

impl VideoResponse {
    pub fn new(video: Video, hls_url: Option<String>) -> Self {
        Self {
            id: video.id,
            title: video.title,
            status: video.status,
            hls_url,
        }
    }
}
