use crate::config::AnalysisConfig;
use crate::services::pose_detector::{PoseDetector, create_pose_detector};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn setup_pose_detector(config: &AnalysisConfig) -> anyhow::Result<Arc<dyn PoseDetector>> {
    let detector = create_pose_detector(
        &config.pose_detector_type,
        &config.pose_detector_url,
        Duration::from_secs(config.pose_detector_timeout_secs),
    )?;

    if detector.name() == "http" {
        info!("🦴 Pose detector: {}", config.pose_detector_url);
    } else {
        tracing::warn!("⚠️  Pose detector disabled, outputs will contain no skeletons");
    }

    Ok(detector.into())
}
