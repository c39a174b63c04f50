use std::env;
use std::path::PathBuf;

/// Runtime configuration for the analysis service
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Maximum upload size in MB (default: 200)
    pub max_upload_size_mb: u64,

    /// Allowed upload extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,

    /// Age in seconds after which uploads are purged (default: 600)
    pub upload_retention_seconds: u64,

    /// Age in seconds after which rendered results are purged (default: 600)
    pub result_retention_seconds: u64,

    /// Directory holding in-flight uploads
    pub upload_dir: PathBuf,

    /// Directory holding rendered outputs
    pub result_dir: PathBuf,

    /// Write chunk size for streamed uploads in bytes (default: 1 MB)
    pub chunk_size: usize,

    /// Interval of the periodic janitor in seconds, 0 disables it (default: 300)
    pub sweep_interval_seconds: u64,

    /// Pose detector type: "http" or "noop" (default: "http")
    pub pose_detector_type: String,

    /// Pose inference endpoint
    pub pose_detector_url: String,

    /// Per-frame pose request timeout in seconds (default: 30)
    pub pose_detector_timeout_secs: u64,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,

    /// Container extension of rendered outputs (default: "mp4")
    pub output_extension: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 200,
            allowed_extensions: ["mp4", "mov", "m4v", "avi", "mkv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            upload_retention_seconds: 600,
            result_retention_seconds: 600,
            upload_dir: PathBuf::from("static/uploads"),
            result_dir: PathBuf::from("static/results"),
            chunk_size: 1024 * 1024, // 1 MB
            sweep_interval_seconds: 300,
            pose_detector_type: "http".to_string(),
            pose_detector_url: "http://127.0.0.1:8500/v1/pose".to_string(),
            pose_detector_timeout_secs: 30,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            output_extension: "mp4".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_upload_size_mb: env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size_mb),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| parse_extensions(&v))
                .filter(|exts| !exts.is_empty())
                .unwrap_or(default.allowed_extensions),

            upload_retention_seconds: env::var("UPLOAD_RETENTION_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.upload_retention_seconds),

            result_retention_seconds: env::var("RESULT_RETENTION_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.result_retention_seconds),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            result_dir: env::var("RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.result_dir),

            chunk_size: env::var("UPLOAD_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(default.chunk_size),

            sweep_interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sweep_interval_seconds),

            pose_detector_type: env::var("POSE_DETECTOR_TYPE")
                .unwrap_or(default.pose_detector_type),

            pose_detector_url: env::var("POSE_DETECTOR_URL").unwrap_or(default.pose_detector_url),

            pose_detector_timeout_secs: env::var("POSE_DETECTOR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.pose_detector_timeout_secs),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            output_extension: env::var("OUTPUT_EXTENSION")
                .map(|v| v.trim_start_matches('.').to_lowercase())
                .unwrap_or(default.output_extension),
        }
    }

    /// Create config for development (no pose service, no periodic sweeps)
    pub fn development() -> Self {
        Self {
            sweep_interval_seconds: 0,
            pose_detector_type: "noop".to_string(),
            ..Self::default()
        }
    }

    /// Upload cap in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Parses a comma separated extension list such as ".mp4, MOV,mkv"
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_upload_size_mb, 200);
        assert_eq!(config.max_upload_bytes(), 200 * 1024 * 1024);
        assert_eq!(config.upload_retention_seconds, 600);
        assert_eq!(config.result_retention_seconds, 600);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(
            config.allowed_extensions,
            vec!["mp4", "mov", "m4v", "avi", "mkv"]
        );
    }

    #[test]
    fn test_huge_upload_limit_saturates() {
        let config = AnalysisConfig {
            max_upload_size_mb: u64::MAX,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.max_upload_bytes(), u64::MAX);
    }

    #[test]
    fn test_development_config() {
        let config = AnalysisConfig::development();
        assert_eq!(config.pose_detector_type, "noop");
        assert_eq!(config.sweep_interval_seconds, 0);
        assert_eq!(config.max_upload_size_mb, 200);
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions(".MP4, mov ,,mkv"), vec!["mp4", "mov", "mkv"]);
        assert!(parse_extensions(" , ").is_empty());
    }
}
