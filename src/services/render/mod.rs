pub mod ffmpeg;
pub mod skeleton;

use crate::services::pose_detector::{PoseDetector, PoseError};
use ffmpeg::{FrameDecoder, FrameEncoder};
use image::RgbImage;
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Could not open video: {0}")]
    OpenFailure(String),

    #[error("Could not create output video writer: {0}")]
    EncoderInitFailure(String),

    #[error("Failed to decode video frame: {0}")]
    DecodeFailure(String),

    #[error("Failed to write output video: {0}")]
    EncodeFailure(String),

    #[error(transparent)]
    Detector(#[from] PoseError),
}

/// Rational frame rate as reported by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Used whenever the source reports a non-positive rate
    pub const FALLBACK: FrameRate = FrameRate { num: 30, den: 1 };

    /// Parses "30000/1001" or "25"; `None` unless strictly positive
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (num, den) = match raw.split_once('/') {
            Some((num, den)) => (num.trim().parse::<u32>().ok()?, den.trim().parse::<u32>().ok()?),
            None => (raw.parse::<u32>().ok()?, 1),
        };

        (num > 0 && den > 0).then_some(Self { num, den })
    }

    /// First positive candidate, or the fallback
    pub fn resolve<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        candidates
            .into_iter()
            .flatten()
            .find_map(Self::parse)
            .unwrap_or(Self::FALLBACK)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Container metadata of a source video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames: u64,
    pub frames_with_pose: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

/// Destination of rendered frames
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), RenderError>;

    /// Flushes and closes the sink; no frame may be written afterwards
    fn finish(&mut self) -> Result<(), RenderError>;
}

/// Lock-step render loop.
///
/// Every decoded frame yields exactly one skeleton frame and one overlay
/// frame, written in source order. The loop stops at the first error.
pub fn render_frames<I, S, O>(
    source: &SourceInfo,
    frames: I,
    detector: &dyn PoseDetector,
    skeleton_sink: &mut S,
    overlay_sink: &mut O,
) -> Result<RenderSummary, RenderError>
where
    I: IntoIterator<Item = Result<RgbImage, RenderError>>,
    S: FrameSink + ?Sized,
    O: FrameSink + ?Sized,
{
    let mut frames_written = 0u64;
    let mut frames_with_pose = 0u64;

    for frame in frames {
        let frame = frame?;
        if frame.dimensions() != (source.width, source.height) {
            return Err(RenderError::DecodeFailure(format!(
                "frame {} is {}x{}, expected {}x{}",
                frames_written,
                frame.width(),
                frame.height(),
                source.width,
                source.height
            )));
        }

        let landmarks = detector.detect(&frame)?;

        let mut skeleton = RgbImage::new(source.width, source.height);
        let mut overlay = frame;
        if let Some(set) = &landmarks {
            skeleton::draw_landmarks(&mut skeleton, set);
            skeleton::draw_landmarks(&mut overlay, set);
            frames_with_pose += 1;
        }

        skeleton_sink.write_frame(&skeleton)?;
        overlay_sink.write_frame(&overlay)?;
        frames_written += 1;

        if frames_written % 100 == 0 {
            tracing::debug!("Rendered {} frames", frames_written);
        }
    }

    skeleton_sink.finish()?;
    overlay_sink.finish()?;

    Ok(RenderSummary {
        frames: frames_written,
        frames_with_pose,
        width: source.width,
        height: source.height,
        frame_rate: source.frame_rate,
    })
}

/// Decodes a video and encodes its skeleton and overlay renderings.
///
/// Blocking: runs child processes and waits on them. Callers on the async
/// executor must go through `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct VideoRenderPipeline {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl VideoRenderPipeline {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Both codec tools can be executed
    pub fn is_available(&self) -> bool {
        ffmpeg::tool_available(&self.ffmpeg_path) && ffmpeg::tool_available(&self.ffprobe_path)
    }

    pub fn render(
        &self,
        input: &Path,
        skeleton_out: &Path,
        overlay_out: &Path,
        detector: &dyn PoseDetector,
    ) -> Result<RenderSummary, RenderError> {
        let source = ffmpeg::probe_source(&self.ffprobe_path, input)?;
        tracing::info!(
            "🎞️ Rendering {} ({}x{} @ {} fps) with {} detector",
            input.display(),
            source.width,
            source.height,
            source.frame_rate,
            detector.name()
        );

        // Both writers must be up before the first frame is decoded
        let mut skeleton_encoder = FrameEncoder::spawn(&self.ffmpeg_path, skeleton_out, &source)?;
        let mut overlay_encoder = FrameEncoder::spawn(&self.ffmpeg_path, overlay_out, &source)?;
        let decoder = FrameDecoder::spawn(&self.ffmpeg_path, input, &source)?;

        // Decoder and encoders are reaped on drop whichever way this returns
        let summary = render_frames(
            &source,
            decoder,
            detector,
            &mut skeleton_encoder,
            &mut overlay_encoder,
        )?;

        tracing::info!(
            "✅ Rendered {} frames ({} with pose) from {}",
            summary.frames,
            summary.frames_with_pose,
            input.display()
        );
        Ok(summary)
    }
}
