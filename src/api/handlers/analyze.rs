use crate::AppState;
use crate::api::error::AppError;
use crate::models::AnalyzeResponse;
use crate::services::analysis::AnalysisOutcome;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

#[utoipa::path(
    post,
    path = "/analyze",
    request_body(content = Multipart, description = "Video upload in the `file` field"),
    responses(
        (status = 200, description = "Skeleton and overlay videos rendered", body = AnalyzeResponse),
        (status = 400, description = "Unsupported file type or media type"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 422, description = "Video could not be processed")
    ),
    tag = "analysis"
)]
pub async fn analyze_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    // Capture errors so the rest of the multipart stream can be consumed
    let result: Result<Json<AnalyzeResponse>, AppError> = async {
        let mut outcome: Option<AnalysisOutcome> = None;

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if err_msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            let name = field.name().unwrap_or_default().to_string();
            if name != "file" || outcome.is_some() {
                continue;
            }

            let filename = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);
            tokio::pin!(reader);

            outcome = Some(
                state
                    .analysis
                    .analyze(filename.as_deref(), content_type.as_deref(), &mut reader)
                    .await?,
            );
        }

        let outcome = outcome.ok_or(AppError::BadRequest("No file provided".to_string()))?;

        Ok(Json(to_response(outcome)))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            tracing::warn!("Analysis failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

fn to_response(outcome: AnalysisOutcome) -> AnalyzeResponse {
    let AnalysisOutcome {
        session,
        artifact,
        summary,
        // Deferred cleanup keeps running after the response is sent
        cleanup: _,
    } = outcome;

    AnalyzeResponse {
        id: session.id.to_string(),
        filename: session.original_filename,
        skeleton_video: format!("/download/{}", artifact.skeleton_file_name()),
        overlay_video: format!("/download/{}", artifact.overlay_file_name()),
        frames: summary.frames,
        frames_with_pose: summary.frames_with_pose,
        width: summary.width,
        height: summary.height,
        fps: summary.frame_rate.as_f64(),
        expires_at: artifact.expires_at,
    }
}
