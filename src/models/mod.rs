pub mod pose;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// One ingested upload, owned by a single request
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: Uuid,
    pub original_filename: String,
    pub stored_path: PathBuf,
    pub byte_count: u64,
    pub created_at: DateTime<Utc>,
}

/// The two rendered videos produced for one upload
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub id: Uuid,
    pub skeleton_path: PathBuf,
    pub overlay_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OutputArtifact {
    pub fn new(id: Uuid, result_dir: &std::path::Path, ext: &str, retention_secs: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            skeleton_path: result_dir.join(skeleton_file_name(&id, ext)),
            overlay_path: result_dir.join(overlay_file_name(&id, ext)),
            created_at,
            expires_at: created_at + Duration::seconds(retention_secs as i64),
        }
    }

    pub fn skeleton_file_name(&self) -> String {
        file_name_of(&self.skeleton_path)
    }

    pub fn overlay_file_name(&self) -> String {
        file_name_of(&self.overlay_path)
    }
}

pub fn upload_file_name(id: &Uuid, original_filename: &str) -> String {
    format!("{}_{}", id, original_filename)
}

pub fn skeleton_file_name(id: &Uuid, ext: &str) -> String {
    format!("skeleton_{}.{}", id, ext)
}

pub fn overlay_file_name(id: &Uuid, ext: &str) -> String {
    format!("overlay_{}.{}", id, ext)
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Successful analysis as returned to the client
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub id: String,
    pub filename: String,
    pub skeleton_video: String,
    pub overlay_video: String,
    pub frames: u64,
    pub frames_with_pose: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub expires_at: DateTime<Utc>,
}
