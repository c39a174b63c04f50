pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AnalysisConfig;
use crate::services::analysis::AnalysisService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::analyze::analyze_video,
        api::handlers::download::download_result,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::AnalyzeResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "analysis", description = "Pose analysis endpoints"),
        (name = "system", description = "System endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AnalysisConfig,
    pub analysis: Arc<AnalysisService>,
}

/// Multipart framing allowance on top of the upload cap
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/analyze", post(api::handlers::analyze::analyze_video))
        .route(
            "/download/:filename",
            get(api::handlers::download::download_result),
        )
        .route("/health", get(api::handlers::health::health_check))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
