use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::common::error::AppError;

/// Rewrites a bare 413 from the transport body limit into the JSON error envelope.
///
/// Rejections produced by handlers already carry the envelope and pass through.
pub async fn envelope_oversized_body(
    State(limit): State<usize>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json(&response) {
        return AppError::PayloadTooLarge { limit }.into_response();
    }

    response
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(mime::APPLICATION_JSON.as_ref()))
}
