use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub pose_detector: String,
    pub upload_dir: String,
    pub result_dir: String,
    pub version: String,
}

fn dir_status(path: &std::path::Path) -> String {
    let status = if path.is_dir() { "present" } else { "missing" };
    status.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.analysis.config();

    Json(HealthResponse {
        status: "ok".to_string(),
        pose_detector: state.analysis.detector_name().to_string(),
        upload_dir: dir_status(&config.upload_dir),
        result_dir: dir_status(&config.result_dir),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
