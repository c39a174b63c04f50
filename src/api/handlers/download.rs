use crate::AppState;
use crate::api::error::AppError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;

#[utoipa::path(
    get,
    path = "/download/{filename}",
    params(
        ("filename" = String, Path, description = "Result file name, e.g. skeleton_<id>.mp4")
    ),
    responses(
        (status = 200, description = "Rendered video stream (video/mp4)"),
        (status = 404, description = "File not found or expired")
    ),
    tag = "analysis"
)]
pub async fn download_result(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let path = state
        .analysis
        .result_path(&filename)
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    // The janitor may remove the file between the check and the open
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound("File not found".to_string())
        } else {
            AppError::Internal(format!("Failed to open {}: {}", path.display(), e))
        }
    })?;
    let content_length = file.metadata().await.ok().map(|m| m.len());

    tracing::info!("📤 Streaming result {}", filename);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(len) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "video.mp4"
    } else {
        &ascii_filename
    };

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename,
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}
