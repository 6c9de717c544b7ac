use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::warn;

use crate::common::error::AppError;

/// A multipart file part read fully into memory.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Reads the part called `field_name`, refusing to buffer more than `limit` bytes.
///
/// `accept` sees the client's filename before any of the body is buffered.
pub async fn read_file_field<F>(
    multipart: &mut Multipart,
    field_name: &str,
    limit: usize,
    accept: F,
) -> Result<UploadedFile, AppError>
where
    F: Fn(&str) -> Result<(), AppError>,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(base_name)
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("Uploaded file has no filename".to_string()))?;
        accept(&file_name)?;

        let content_type = field
            .content_type()
            .map(str::to_string)
            .filter(|ct| !ct.is_empty());

        let data = read_bounded(field, limit).await?;

        return Ok(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    Err(AppError::InvalidInput(format!(
        "No '{}' field found in multipart request",
        field_name
    )))
}

/// Last path component of a client-supplied filename.
///
/// Browsers and CLI tools may send `C:\fakepath\clip.mp4` or `../clip.mp4`; only
/// `clip.mp4` is kept so it can sit under `source/{id}/` as a single key segment.
pub fn base_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

async fn read_bounded(mut field: Field<'_>, limit: usize) -> Result<Bytes, AppError> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| multipart_error(e, limit))?;

        if buffer.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge { limit };
    }
    warn!(error = %err, "Rejecting malformed multipart body");
    AppError::InvalidInput(format!("Malformed multipart body: {}", err.body_text()))
}
