use crate::services::analysis::AnalysisError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    fn stage(&self) -> &'static str {
        match self {
            AppError::Analysis(e) => e.stage(),
            AppError::BadRequest(_) => "validation",
            AppError::PayloadTooLarge(_) => "upload",
            AppError::NotFound(_) => "download",
            AppError::Internal(_) => "storage",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let stage = self.stage();
        let (status, message) = match self {
            AppError::Analysis(e) => match e {
                AnalysisError::Validation(_) | AnalysisError::UploadInterrupted(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                AnalysisError::SizeExceeded { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
                }
                AnalysisError::IoFailure(_) | AnalysisError::Internal(_) => {
                    tracing::error!("Analysis error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Upload failed: {}", e),
                    )
                }
                _ => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("An error occurred during analysis: {}", e),
                ),
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "stage": stage,
        }));

        (status, body).into_response()
    }
}
