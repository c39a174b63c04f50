use crate::config::AnalysisConfig;
use crate::models::{OutputArtifact, UploadSession, upload_file_name};
use crate::services::ingest::{IngestError, UploadIngestor};
use crate::services::janitor::{self, SweepReport};
use crate::services::pose_detector::PoseDetector;
use crate::services::render::{RenderError, RenderSummary, VideoRenderPipeline};
use crate::utils::validation::{ValidationError, is_safe_file_name, validate_upload};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{}", validation_message(.0))]
    Validation(#[from] ValidationError),

    #[error("File size exceeds the limit of {limit_mb} MB")]
    SizeExceeded { limit_mb: u64 },

    #[error("Upload was interrupted: {0}")]
    UploadInterrupted(String),

    #[error("Could not open video: {0}")]
    OpenFailure(String),

    #[error("Could not create output video writer: {0}")]
    EncoderInitFailure(String),

    #[error("Failed to decode video: {0}")]
    DecodeFailure(String),

    #[error("Failed to write output video: {0}")]
    EncodeFailure(String),

    #[error("Pose detection failed: {0}")]
    DetectorFailure(String),

    #[error("Storage error: {0}")]
    IoFailure(String),

    #[error("Analysis task failed: {0}")]
    Internal(String),
}

fn validation_message(e: &ValidationError) -> &str {
    &e.message
}

impl AnalysisError {
    /// Name of the stage that failed, reported to the caller
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "validation",
            AnalysisError::SizeExceeded { .. } | AnalysisError::UploadInterrupted(_) => "upload",
            AnalysisError::IoFailure(_) => "storage",
            AnalysisError::OpenFailure(_)
            | AnalysisError::EncoderInitFailure(_)
            | AnalysisError::DecodeFailure(_)
            | AnalysisError::EncodeFailure(_)
            | AnalysisError::DetectorFailure(_)
            | AnalysisError::Internal(_) => "processing",
        }
    }
}

impl From<IngestError> for AnalysisError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::SizeExceeded { limit_mb } => AnalysisError::SizeExceeded { limit_mb },
            IngestError::Interrupted(e) => AnalysisError::UploadInterrupted(e.to_string()),
            IngestError::Io(e) => AnalysisError::IoFailure(e.to_string()),
        }
    }
}

impl From<RenderError> for AnalysisError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::OpenFailure(msg) => AnalysisError::OpenFailure(msg),
            RenderError::EncoderInitFailure(msg) => AnalysisError::EncoderInitFailure(msg),
            RenderError::DecodeFailure(msg) => AnalysisError::DecodeFailure(msg),
            RenderError::EncodeFailure(msg) => AnalysisError::EncodeFailure(msg),
            RenderError::Detector(e) => AnalysisError::DetectorFailure(e.to_string()),
        }
    }
}

/// Result of one successful analysis request
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub session: UploadSession,
    pub artifact: OutputArtifact,
    pub summary: RenderSummary,
    /// Completes once the deferred input deletion and sweeps have run
    pub cleanup: JoinHandle<()>,
}

/// Per-request orchestration: validate, ingest, render, clean up.
///
/// Holds no per-request state; every call owns its identifier and the files
/// derived from it, so concurrent calls never share paths.
pub struct AnalysisService {
    config: AnalysisConfig,
    ingestor: UploadIngestor,
    pipeline: VideoRenderPipeline,
    detector: Arc<dyn PoseDetector>,
}

impl AnalysisService {
    pub fn new(config: AnalysisConfig, detector: Arc<dyn PoseDetector>) -> Self {
        let ingestor = UploadIngestor::new(config.max_upload_size_mb, config.chunk_size);
        let pipeline = VideoRenderPipeline::new(&config.ffmpeg_path, &config.ffprobe_path);
        Self {
            config,
            ingestor,
            pipeline,
            detector,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Whether ffmpeg and ffprobe can be executed; blocking
    pub fn codec_tools_available(&self) -> bool {
        self.pipeline.is_available()
    }

    /// Checks upload metadata without touching the disk
    pub fn validate(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<String, AnalysisError> {
        Ok(validate_upload(
            filename,
            content_type,
            &self.config.allowed_extensions,
        )?)
    }

    /// Runs one request end to end.
    ///
    /// The body is only read after validation passed. The call returns once
    /// both outputs are fully written; deletion of the upload and the janitor
    /// sweeps run afterwards on a detached task.
    pub async fn analyze<R>(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
        body: &mut R,
    ) -> Result<AnalysisOutcome, AnalysisError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let original_filename = self.validate(filename, content_type)?;

        let id = Uuid::new_v4();
        let stored_path = self
            .config
            .upload_dir
            .join(upload_file_name(&id, &original_filename));

        tracing::info!("📥 Receiving upload {} as {}", original_filename, id);
        let byte_count = self.ingestor.ingest(body, &stored_path).await?;

        let session = UploadSession {
            id,
            original_filename,
            stored_path,
            byte_count,
            created_at: Utc::now(),
        };

        let artifact = OutputArtifact::new(
            id,
            &self.config.result_dir,
            &self.config.output_extension,
            self.config.result_retention_seconds,
        );

        match self.render(&session, &artifact).await {
            Ok(summary) => {
                let cleanup = self.schedule_cleanup(Some(session.stored_path.clone()));
                Ok(AnalysisOutcome {
                    session,
                    artifact,
                    summary,
                    cleanup,
                })
            }
            Err(e) => {
                tracing::error!("❌ Analysis {} failed: {}", id, e);
                remove_quietly(&session.stored_path).await;
                remove_quietly(&artifact.skeleton_path).await;
                remove_quietly(&artifact.overlay_path).await;
                self.schedule_cleanup(None);
                Err(e)
            }
        }
    }

    async fn render(
        &self,
        session: &UploadSession,
        artifact: &OutputArtifact,
    ) -> Result<RenderSummary, AnalysisError> {
        let pipeline = self.pipeline.clone();
        let detector = Arc::clone(&self.detector);
        let input = session.stored_path.clone();
        let skeleton_out = artifact.skeleton_path.clone();
        let overlay_out = artifact.overlay_path.clone();

        let summary = tokio::task::spawn_blocking(move || {
            pipeline.render(&input, &skeleton_out, &overlay_out, detector.as_ref())
        })
        .await
        .map_err(|e| AnalysisError::Internal(e.to_string()))??;

        Ok(summary)
    }

    /// Deletes `input` (if any) then sweeps both directories, off the request path
    fn schedule_cleanup(&self, input: Option<PathBuf>) -> JoinHandle<()> {
        let upload_dir = self.config.upload_dir.clone();
        let result_dir = self.config.result_dir.clone();
        let upload_retention = self.config.upload_retention_seconds;
        let result_retention = self.config.result_retention_seconds;

        tokio::spawn(async move {
            if let Some(input) = input {
                remove_quietly(&input).await;
            }
            janitor::sweep(upload_dir, upload_retention).await;
            janitor::sweep(result_dir, result_retention).await;
        })
    }

    /// Sweeps both directories with their own retention windows
    pub async fn sweep_all(&self) -> (SweepReport, SweepReport) {
        let uploads = janitor::sweep(
            self.config.upload_dir.clone(),
            self.config.upload_retention_seconds,
        )
        .await;
        let results = janitor::sweep(
            self.config.result_dir.clone(),
            self.config.result_retention_seconds,
        )
        .await;
        (uploads, results)
    }

    /// Path of an existing result file, `None` for unknown or unsafe names
    pub fn result_path(&self, name: &str) -> Option<PathBuf> {
        if !is_safe_file_name(name) {
            return None;
        }
        let path = self.config.result_dir.join(name);
        path.is_file().then_some(path)
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!("Error deleting file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pose_detector::NoOpPoseDetector;

    fn service(dir: &Path, max_mb: u64) -> AnalysisService {
        let upload_dir = dir.join("uploads");
        let result_dir = dir.join("results");
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::create_dir_all(&result_dir).unwrap();

        let config = AnalysisConfig {
            upload_dir,
            result_dir,
            max_upload_size_mb: max_mb,
            ..AnalysisConfig::development()
        };
        AnalysisService::new(config, Arc::new(NoOpPoseDetector))
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_error_stages() {
        let validation = AnalysisError::from(ValidationError {
            code: "UNSUPPORTED_EXTENSION",
            message: "nope".to_string(),
        });
        assert_eq!(validation.stage(), "validation");
        assert_eq!(validation.to_string(), "nope");
        assert_eq!(
            AnalysisError::from(IngestError::SizeExceeded { limit_mb: 200 }).stage(),
            "upload"
        );
        assert_eq!(
            AnalysisError::from(RenderError::OpenFailure("x".into())).stage(),
            "processing"
        );
        assert_eq!(AnalysisError::IoFailure("disk".into()).stage(), "storage");
        let interrupted = IngestError::Interrupted(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(AnalysisError::from(interrupted).stage(), "upload");
    }

    #[tokio::test]
    async fn test_long_filename_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1);

        for len in [230, 260] {
            let name = format!("{}.mp4", "a".repeat(len));
            let stored = service.validate(Some(&name), Some("video/mp4")).unwrap();
            assert!(stored.ends_with(".mp4"));

            // Ingest succeeds; the bytes are not a video so rendering fails
            let err = service
                .analyze(Some(&name), Some("video/mp4"), &mut &b"xx"[..])
                .await
                .unwrap_err();
            assert!(matches!(err, AnalysisError::OpenFailure(_)), "{len}: {err}");
            assert_eq!(err.stage(), "processing");
        }
        assert!(is_empty(&dir.path().join("uploads")));
    }

    #[tokio::test]
    async fn test_rejected_extension_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1);

        let err = service
            .analyze(Some("notes.txt"), Some("video/mp4"), &mut &b"data"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Validation(_)));
        assert!(is_empty(&dir.path().join("uploads")));
        assert!(is_empty(&dir.path().join("results")));
    }

    #[tokio::test]
    async fn test_oversized_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1);
        let data = vec![0u8; 1024 * 1024 + 10];

        let err = service
            .analyze(Some("big.mp4"), Some("video/mp4"), &mut &data[..])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::SizeExceeded { limit_mb: 1 }));
        assert!(is_empty(&dir.path().join("uploads")));
    }

    #[tokio::test]
    async fn test_undecodable_video_is_processing_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1);

        let err = service
            .analyze(
                Some("broken.mp4"),
                Some("video/mp4"),
                &mut &b"definitely not a video"[..],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::OpenFailure(_)));
        assert_eq!(err.stage(), "processing");
        assert!(is_empty(&dir.path().join("uploads")));
        assert!(is_empty(&dir.path().join("results")));
    }

    #[test]
    fn test_result_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1);
        std::fs::write(dir.path().join("results").join("skeleton_a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"x").unwrap();

        assert!(service.result_path("skeleton_a.mp4").is_some());
        assert!(service.result_path("missing.mp4").is_none());
        assert!(service.result_path("../secret.txt").is_none());
    }
}
