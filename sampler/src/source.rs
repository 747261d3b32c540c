use async_trait::async_trait;
use image::RgbImage;

/// A seekable media resource frames can be pulled from.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Total duration in milliseconds. Failing here means the source could
    /// not be opened at all.
    async fn duration_ms(&self) -> Result<i64, SourceError>;

    /// Decode the frame closest to `timestamp_us`. The decoder picks the best
    /// available match, not necessarily a frame at exactly that instant.
    async fn frame_at(&self, timestamp_us: i64) -> Result<RgbImage, SourceError>;

    /// Human-readable name for logging.
    fn describe(&self) -> String {
        "video source".into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("video file not found: {0}")]
    NotFound(String),
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, String),
    #[error("{0} exited with non-zero status: {1}")]
    ToolFailed(&'static str, String),
    #[error("could not parse duration from ffprobe output: {0:?}")]
    BadDuration(String),
    #[error("decoder produced no frame at {0}us")]
    NoFrame(i64),
    #[error("failed to decode frame image: {0}")]
    Decode(String),
    #[error("frame extraction timed out after {0:?}")]
    Timeout(std::time::Duration),
}
