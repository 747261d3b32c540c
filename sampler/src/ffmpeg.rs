//! ffprobe/ffmpeg CLI backed [`VideoSource`].
//!
//! Duration comes from the container metadata. Each frame is pulled with an
//! input-side `-ss` seek, which decodes up to the requested timestamp and
//! yields the closest frame, then piped back as PNG and decoded in-process.

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::source::{SourceError, VideoSource};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

pub struct FfmpegSource {
    path: PathBuf,
}

impl FfmpegSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn ensure_exists(&self) -> Result<(), SourceError> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(SourceError::NotFound(self.path.display().to_string()))
        }
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn duration_ms(&self) -> Result<i64, SourceError> {
        self.ensure_exists()?;

        let output = Command::new(FFPROBE)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(&self.path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Spawn("ffprobe", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(path = %self.path.display(), stderr = %stderr, "ffprobe failed");
            return Err(SourceError::ToolFailed("ffprobe", stderr.into_owned()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration_ms = parse_duration_ms(&stdout)?;
        debug!(path = %self.path.display(), duration_ms, "probed video duration");
        Ok(duration_ms)
    }

    async fn frame_at(&self, timestamp_us: i64) -> Result<RgbImage, SourceError> {
        self.ensure_exists()?;

        let seek = format!("{:.6}", timestamp_us as f64 / 1_000_000.0);
        let output = Command::new(FFMPEG)
            .args(["-v", "error", "-ss", &seek, "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Spawn("ffmpeg", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::ToolFailed("ffmpeg", stderr.into_owned()));
        }
        if output.stdout.is_empty() {
            return Err(SourceError::NoFrame(timestamp_us));
        }

        let image = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(image.to_rgb8())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// ffprobe prints the container duration in (fractional) seconds.
fn parse_duration_ms(stdout: &str) -> Result<i64, SourceError> {
    let trimmed = stdout.trim();
    let secs: f64 = trimmed
        .parse()
        .map_err(|_| SourceError::BadDuration(trimmed.to_string()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(SourceError::BadDuration(trimmed.to_string()));
    }
    Ok((secs * 1000.0).floor() as i64)
}
