use crate::models::pose::{FrameLandmarkSet, LANDMARK_COUNT, Landmark};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Failed to encode frame for pose detection: {0}")]
    Encode(String),

    #[error("Pose service request failed: {0}")]
    Request(String),

    #[error("Invalid pose service response: {0}")]
    InvalidResponse(String),
}

/// Per-frame pose estimation.
///
/// Stateless request/response: one frame in, zero or one full landmark set
/// out. Implementations are called from the blocking render thread, never
/// from the async executor.
pub trait PoseDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Option<FrameLandmarkSet>, PoseError>;

    fn name(&self) -> &'static str;
}

/// Detector backed by a pose inference HTTP service.
///
/// The frame is posted as `image/jpeg`; the service answers
/// `{"landmarks": null}` or `{"landmarks": [{"x":..,"y":..,"z":..,"visibility":..}, ...]}`.
pub struct HttpPoseDetector {
    client: reqwest::Client,
    endpoint: String,
    runtime: Handle,
}

#[derive(Debug, Deserialize)]
struct PoseResponse {
    landmarks: Option<Vec<Landmark>>,
}

impl HttpPoseDetector {
    /// Must be created inside a tokio runtime; requests are driven on it.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, PoseError> {
        let runtime = Handle::try_current()
            .map_err(|e| PoseError::Request(format!("No tokio runtime available: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PoseError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            runtime,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn encode_frame(frame: &RgbImage) -> Result<Vec<u8>, PoseError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(frame)
            .map_err(|e| PoseError::Encode(e.to_string()))?;
        Ok(out)
    }

    async fn request(&self, body: Vec<u8>) -> Result<PoseResponse, PoseError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await
            .map_err(|e| PoseError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PoseError::Request(format!(
                "pose service returned {}: {}",
                status, text
            )));
        }

        response
            .json::<PoseResponse>()
            .await
            .map_err(|e| PoseError::InvalidResponse(e.to_string()))
    }

    /// Turns a service answer into a landmark set, rejecting partial poses
    fn into_landmark_set(response: PoseResponse) -> Result<Option<FrameLandmarkSet>, PoseError> {
        match response.landmarks {
            None => Ok(None),
            Some(points) if points.is_empty() => Ok(None),
            Some(points) => {
                let count = points.len();
                FrameLandmarkSet::from_vec(points).map(Some).ok_or_else(|| {
                    PoseError::InvalidResponse(format!(
                        "expected {} landmarks, got {}",
                        LANDMARK_COUNT, count
                    ))
                })
            }
        }
    }
}

impl PoseDetector for HttpPoseDetector {
    fn detect(&self, frame: &RgbImage) -> Result<Option<FrameLandmarkSet>, PoseError> {
        let body = Self::encode_frame(frame)?;
        let response = self.runtime.block_on(self.request(body))?;
        Self::into_landmark_set(response)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Detector that never finds anyone (development mode)
pub struct NoOpPoseDetector;

impl PoseDetector for NoOpPoseDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Option<FrameLandmarkSet>, PoseError> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Factory function to create a detector based on configuration
pub fn create_pose_detector(
    detector_type: &str,
    endpoint: &str,
    timeout: Duration,
) -> Result<Box<dyn PoseDetector>, PoseError> {
    match detector_type.to_lowercase().as_str() {
        "http" => Ok(Box::new(HttpPoseDetector::new(endpoint.to_string(), timeout)?)),
        "noop" | "none" | "disabled" => Ok(Box::new(NoOpPoseDetector)),
        _ => {
            tracing::warn!(
                "Unknown pose detector type '{}', using NoOpPoseDetector",
                detector_type
            );
            Ok(Box::new(NoOpPoseDetector))
        }
    }
}
