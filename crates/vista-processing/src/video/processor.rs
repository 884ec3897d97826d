//! ffprobe / ffmpeg invocation

use crate::error::ProbeError;
use crate::metadata::ProbeReport;
use crate::video::probe_output::parse_probe_output;
use async_trait::async_trait;
use bytes::Bytes;
use std::process::Output;
use tokio::process::Command;

/// External probing and frame extraction tool.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Inspect the media at `url` (a URL or a local path).
    async fn probe(&self, url: &str) -> Result<ProbeReport, ProbeError>;

    /// Extract a single JPEG frame `offset_secs` into the media at `url`.
    async fn extract_preview(&self, url: &str, offset_secs: f64) -> Result<Bytes, ProbeError>;
}

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<(), ProbeError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProbeError::InvalidToolPath(format!(
            "path contains dangerous characters: {}",
            path
        )));
    }

    if path.contains("..") {
        return Err(ProbeError::InvalidToolPath(format!(
            "path contains directory traversal: {}",
            path
        )));
    }

    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\')
    {
        return Err(ProbeError::InvalidToolPath(format!(
            "path contains unsafe characters: {}",
            path
        )));
    }

    Ok(())
}

/// Inputs are passed as a single argument (no shell), but must not be
/// mistaken for an option.
fn validate_input(url: &str) -> Result<(), ProbeError> {
    if url.trim().is_empty() {
        return Err(ProbeError::InvalidInput("empty input".to_string()));
    }
    if url.starts_with('-') {
        return Err(ProbeError::InvalidInput(format!(
            "input looks like an option: {}",
            url
        )));
    }
    Ok(())
}

fn check_status(tool: &'static str, output: &Output) -> Result<(), ProbeError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ProbeError::Failed {
        tool,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn spawn_error(tool: &'static str, source: std::io::Error) -> ProbeError {
    match source.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            ProbeError::Launch { tool, source }
        }
        _ => ProbeError::Io { tool, source },
    }
}

pub struct FfmpegProber {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfmpegProber {
    pub fn new(ffprobe_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Result<Self, ProbeError> {
        let ffprobe_path = ffprobe_path.into();
        let ffmpeg_path = ffmpeg_path.into();
        validate_path(&ffprobe_path)?;
        validate_path(&ffmpeg_path)?;

        Ok(Self {
            ffprobe_path,
            ffmpeg_path,
        })
    }

    async fn extract_frame(&self, url: &str, offset_secs: f64) -> Result<Bytes, ProbeError> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", offset_secs))
            .arg("-i")
            .arg(url)
            .args(["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg", "pipe:1"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error("ffmpeg", e))?;

        check_status("ffmpeg", &output)?;
        Ok(Bytes::from(output.stdout))
    }
}

#[async_trait]
impl Prober for FfmpegProber {
    #[tracing::instrument(skip(self, url), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, url: &str) -> Result<ProbeReport, ProbeError> {
        validate_input(url)?;
        let start = std::time::Instant::now();

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error("ffprobe", e))?;

        check_status("ffprobe", &output)?;
        let report = parse_probe_output(&output.stdout)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            format = %report.format,
            width = report.width,
            height = report.height,
            media_duration = ?report.duration,
            "Probe completed"
        );

        Ok(report)
    }

    #[tracing::instrument(skip(self, url), fields(
        process.executable.name = "ffmpeg",
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "preview"
    ))]
    async fn extract_preview(&self, url: &str, offset_secs: f64) -> Result<Bytes, ProbeError> {
        validate_input(url)?;

        let mut frame = self.extract_frame(url, offset_secs).await?;
        if frame.is_empty() && offset_secs > 0.0 {
            // Clips shorter than the offset yield no frame; take the first one.
            tracing::debug!(offset_secs, "No frame at offset, retrying from start");
            frame = self.extract_frame(url, 0.0).await?;
        }

        if frame.is_empty() {
            return Err(ProbeError::NoStreams("no decodable video frame".to_string()));
        }

        tracing::info!(size_bytes = frame.len(), "Preview extracted");
        Ok(frame)
    }
}
