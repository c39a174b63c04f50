// ffprobe / ffmpeg child processes for frame-level video I/O

use super::{FrameRate, FrameSink, RenderError, SourceInfo};
use image::RgbImage;
use serde::Deserialize;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Checks whether a codec tool can be executed
pub fn tool_available(path: &str) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Reads width, height and frame rate of the first video stream
pub fn probe_source(ffprobe_path: &str, input: &Path) -> Result<SourceInfo, RenderError> {
    if !input.is_file() {
        return Err(RenderError::OpenFailure(format!(
            "{} does not exist",
            input.display()
        )));
    }

    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate",
            "-print_format",
            "json",
        ])
        .arg(input)
        .output()
        .map_err(|e| RenderError::OpenFailure(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(RenderError::OpenFailure(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<SourceInfo, RenderError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| RenderError::OpenFailure(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::OpenFailure("No video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(RenderError::OpenFailure(
                "Video stream has no dimensions".to_string(),
            ));
        }
    };

    let frame_rate = FrameRate::resolve([
        stream.avg_frame_rate.as_deref(),
        stream.r_frame_rate.as_deref(),
    ]);

    Ok(SourceInfo {
        width,
        height,
        frame_rate,
    })
}

/// Drains a child's stderr so it never blocks on a full pipe
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut text = String::new();
        match reader.read_to_string(&mut text) {
            Ok(_) => text,
            Err(e) => format!("<failed to read ffmpeg stderr: {}>", e),
        }
    }))
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Lazy, finite, single-pass sequence of decoded RGB frames.
///
/// Re-reading the video requires spawning a new decoder.
pub struct FrameDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frame_len: usize,
    done: bool,
}

impl FrameDecoder {
    pub fn spawn(ffmpeg_path: &str, input: &Path, source: &SourceInfo) -> Result<Self, RenderError> {
        let mut child = Command::new(ffmpeg_path)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(input)
            .args([
                "-map", "0:v:0", "-an", "-sn", "-vsync", "0", "-f", "rawvideo", "-pix_fmt",
                "rgb24", "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::OpenFailure(format!("Failed to start ffmpeg: {}", e)))?;

        let stderr = drain_stderr(&mut child);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                reap(&mut child);
                return Err(RenderError::OpenFailure(
                    "Failed to capture ffmpeg stdout".to_string(),
                ));
            }
        };

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(1 << 20, stdout),
            stderr,
            width: source.width,
            height: source.height,
            frame_len: source.width as usize * source.height as usize * 3,
            done: false,
        })
    }

    /// Fills `buf`; `Ok(0)` only at a clean end of stream
    fn read_frame(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        let status = self
            .child
            .wait()
            .map_err(|e| RenderError::DecodeFailure(e.to_string()))?;
        let stderr = join_stderr(self.stderr.take());

        if !status.success() {
            return Err(RenderError::DecodeFailure(format!(
                "ffmpeg exited with {}: {}",
                status, stderr
            )));
        }
        Ok(())
    }
}

impl Iterator for FrameDecoder {
    type Item = Result<RgbImage, RenderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len];
        let result = match self.read_frame(&mut buf) {
            Ok(0) => {
                self.done = true;
                return self.finish().err().map(Err);
            }
            Ok(n) if n < self.frame_len => Err(RenderError::DecodeFailure(format!(
                "truncated frame: got {} of {} bytes",
                n, self.frame_len
            ))),
            Ok(_) => RgbImage::from_raw(self.width, self.height, buf).ok_or_else(|| {
                RenderError::DecodeFailure("frame buffer has the wrong size".to_string())
            }),
            Err(e) => Err(RenderError::DecodeFailure(e.to_string())),
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        reap(&mut self.child);
        let _ = join_stderr(self.stderr.take());
    }
}

/// Pixel format that keeps the exact source size
fn output_pixel_format(width: u32, height: u32) -> &'static str {
    // 4:2:0 chroma subsampling needs even dimensions
    if width % 2 == 0 && height % 2 == 0 {
        "yuv420p"
    } else {
        "yuv444p"
    }
}

/// H.264 / MP4 writer fed with raw RGB frames
pub struct FrameEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
}

/// Encodes one black frame of the output geometry to `-f null`, proving the
/// ffmpeg build has libx264 and accepts the size and pixel format
fn check_encoder(ffmpeg_path: &str, source: &SourceInfo) -> Result<(), String> {
    let color = format!("color=c=black:s={}x{}:r=1", source.width, source.height);
    let output = Command::new(ffmpeg_path)
        .args(["-v", "error", "-nostdin", "-f", "lavfi", "-i", color.as_str()])
        .args(["-frames:v", "1", "-c:v", "libx264", "-pix_fmt"])
        .arg(output_pixel_format(source.width, source.height))
        .args(["-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to start ffmpeg: {}", e))?;

    if !output.status.success() {
        return Err(format!(
            "encoder check exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

impl FrameEncoder {
    /// Starts an encoder writing to `output`.
    ///
    /// Everything that can be known up front is checked here so a dead
    /// encoder is reported as `EncoderInitFailure` before any frame is read:
    /// the output file must be creatable, the encoder must work for this
    /// geometry and the child must still be running after start.
    pub fn spawn(ffmpeg_path: &str, output: &Path, source: &SourceInfo) -> Result<Self, RenderError> {
        let init_failure = |reason: String| {
            if let Err(e) = std::fs::remove_file(output) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", output.display(), e);
                }
            }
            RenderError::EncoderInitFailure(format!("{}: {}", output.display(), reason))
        };

        std::fs::File::create(output).map_err(|e| {
            RenderError::EncoderInitFailure(format!(
                "Cannot create {}: {}",
                output.display(),
                e
            ))
        })?;
        check_encoder(ffmpeg_path, source).map_err(init_failure)?;

        let size = format!("{}x{}", source.width, source.height);
        let rate = source.frame_rate.to_string();

        let mut child = Command::new(ffmpeg_path)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", size.as_str(), "-framerate", rate.as_str(), "-i", "-"])
            .args(["-an", "-c:v", "libx264", "-preset", "veryfast"])
            .args(["-pix_fmt", output_pixel_format(source.width, source.height)])
            .args(["-movflags", "+faststart"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| init_failure(format!("Failed to start ffmpeg: {}", e)))?;

        let stderr = drain_stderr(&mut child);
        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                reap(&mut child);
                return Err(init_failure("Failed to capture ffmpeg stdin".to_string()));
            }
        };

        // A child that is already gone never consumed a frame
        if let Ok(Some(status)) = child.try_wait() {
            drop(stdin);
            let stderr = join_stderr(stderr);
            return Err(init_failure(format!("ffmpeg exited with {}: {}", status, stderr)));
        }

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(1 << 20, stdin)),
            stderr,
            width: source.width,
            height: source.height,
        })
    }

    fn failure(&mut self, context: String) -> RenderError {
        // Closing stdin lets ffmpeg exit and flush its diagnostics
        self.stdin = None;
        reap(&mut self.child);
        let stderr = join_stderr(self.stderr.take());
        if stderr.is_empty() {
            RenderError::EncodeFailure(context)
        } else {
            RenderError::EncodeFailure(format!("{}: {}", context, stderr))
        }
    }
}

impl FrameSink for FrameEncoder {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), RenderError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(RenderError::EncodeFailure(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let written = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame.as_raw()),
            None => {
                return Err(RenderError::EncodeFailure(
                    "encoder already finished".to_string(),
                ));
            }
        };

        match written {
            Ok(()) => Ok(()),
            Err(e) => Err(self.failure(e.to_string())),
        }
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        let Some(mut stdin) = self.stdin.take() else {
            return Err(RenderError::EncodeFailure(
                "encoder already finished".to_string(),
            ));
        };

        if let Err(e) = stdin.flush() {
            return Err(self.failure(e.to_string()));
        }
        drop(stdin);

        let status = self
            .child
            .wait()
            .map_err(|e| RenderError::EncodeFailure(e.to_string()))?;
        let stderr = join_stderr(self.stderr.take());

        if !status.success() {
            return Err(RenderError::EncodeFailure(format!(
                "ffmpeg exited with {}: {}",
                status, stderr
            )));
        }
        Ok(())
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        self.stdin = None;
        reap(&mut self.child);
        let _ = join_stderr(self.stderr.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"30/1","r_frame_rate":"30/1"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 640);
        assert_eq!(info.height, 480);
        assert_eq!(info.frame_rate, FrameRate { num: 30, den: 1 });
    }

    #[test]
    fn test_probe_frame_rate_fallback() {
        let json = br#"{"streams":[{"width":64,"height":48,"avg_frame_rate":"0/0","r_frame_rate":"0/0"}]}"#;
        assert_eq!(parse_probe_output(json).unwrap().frame_rate, FrameRate::FALLBACK);

        let json = br#"{"streams":[{"width":64,"height":48,"avg_frame_rate":"0/0","r_frame_rate":"25/1"}]}"#;
        assert_eq!(
            parse_probe_output(json).unwrap().frame_rate,
            FrameRate { num: 25, den: 1 }
        );
    }

    #[test]
    fn test_probe_without_video_stream() {
        let err = parse_probe_output(br#"{"streams":[]}"#).unwrap_err();
        assert!(matches!(err, RenderError::OpenFailure(_)));
        let err = parse_probe_output(br#"{}"#).unwrap_err();
        assert!(matches!(err, RenderError::OpenFailure(_)));
        let err = parse_probe_output(b"not json").unwrap_err();
        assert!(matches!(err, RenderError::OpenFailure(_)));
    }

    #[test]
    fn test_output_pixel_format() {
        assert_eq!(output_pixel_format(640, 480), "yuv420p");
        assert_eq!(output_pixel_format(641, 480), "yuv444p");
        assert_eq!(output_pixel_format(640, 481), "yuv444p");
    }

    #[test]
    fn test_missing_input_is_open_failure() {
        let err = probe_source("ffprobe", Path::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, RenderError::OpenFailure(_)));
    }

    #[test]
    fn test_missing_encoder_binary() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceInfo {
            width: 16,
            height: 16,
            frame_rate: FrameRate::FALLBACK,
        };
        let result = FrameEncoder::spawn(
            "/nonexistent/ffmpeg-binary",
            &dir.path().join("out.mp4"),
            &source,
        );
        assert!(matches!(result, Err(RenderError::EncoderInitFailure(_))));
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[test]
    fn test_unwritable_output_is_init_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceInfo {
            width: 16,
            height: 16,
            frame_rate: FrameRate::FALLBACK,
        };
        let result = FrameEncoder::spawn(
            "ffmpeg",
            &dir.path().join("missing").join("out.mp4"),
            &source,
        );
        assert!(matches!(result, Err(RenderError::EncoderInitFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_that_exits_is_init_failure() {
        // `false` starts fine and exits 1 without reading its input
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let source = SourceInfo {
            width: 16,
            height: 16,
            frame_rate: FrameRate::FALLBACK,
        };
        let result = FrameEncoder::spawn("false", &output, &source);
        assert!(matches!(result, Err(RenderError::EncoderInitFailure(_))));
        assert!(!output.exists());
    }
}
