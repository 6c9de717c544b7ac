use utoipa::OpenApi;

use crate::common::response::ApiResponse;
use crate::modules::health::dto::{BackendState, HealthResponse, ReadinessResponse};
use crate::modules::video::dto::VideoResponse;
use crate::modules::video::model::VideoStatus;

#[derive(OpenApi)]
#[openapi(
    info(title = "VOD API"),
    paths(
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::list_videos,
        crate::modules::health::handler::health,
        crate::modules::health::handler::ready,
    ),
    components(
        schemas(
            VideoResponse,
            VideoStatus,
            HealthResponse,
            ReadinessResponse,
            BackendState,
            ApiResponse<String>,
        )
    ),
    tags(
        (name = "Videos", description = "Upload and playback status"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
