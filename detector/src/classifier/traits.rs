use async_trait::async_trait;
use frame_overlay_common::frame::Detection;
use image::RgbImage;

/// Opaque object detector.
///
/// Implementations receive an image already resized to [`input_size`] and
/// return every object they found, in their own order, with rectangles in
/// that input coordinate space.
///
/// [`input_size`]: Classifier::input_size
#[async_trait]
pub trait Classifier: Send + Sync {
    /// `(width, height)` the model expects.
    fn input_size(&self) -> (u32, u32);

    async fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, ClassifierError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier could not be initialized: {0}")]
    Unavailable(String),
    #[error("classifier failed to run: {0}")]
    Failed(String),
    #[error("classification timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("frame has no decoded image")]
    MissingImage,
}
