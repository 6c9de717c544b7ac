use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::dto::VideoResponse;
use super::service::VideoService;
use crate::common::error::AppError;
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::common::upload::read_file_field;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

/// Upload a video
/// The whole file is buffered in memory, stored, recorded and queued for transcoding.
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video queued", body = VideoResponse),
        (status = 400, description = "Unsupported file extension or missing file field", body = ApiResponse<String>),
        (status = 413, description = "Upload too large", body = ApiResponse<String>),
        (status = 500, description = "Storage, database or queue failure", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_file_field(
        &mut multipart,
        FILE_FIELD,
        state.config.max_upload_bytes,
        VideoService::validate_file_name,
    )
    .await?;

    let video = VideoService::submit(&state, upload).await?;
    Ok(ApiSuccess(video, StatusCode::OK))
}

/// List videos
/// Newest first; `hls_url` is set once the transcoded manifest exists.
#[utoipa::path(
    get,
    path = "/videos",
    responses(
        (status = 200, description = "Videos, newest first", body = Vec<VideoResponse>),
        (status = 500, description = "Metadata store failure", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn list_videos(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let videos = VideoService::list(&state).await?;
    Ok(ApiSuccess(videos, StatusCode::OK))
}
