use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One sampled video frame.
///
/// `image` is `None` when the decoder could not produce a picture for this
/// timestamp; the frame is still emitted so downstream indices stay aligned.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub timestamp_ms: i64,
    pub image: Option<RgbImage>,
}

impl Frame {
    pub fn new(index: usize, timestamp_ms: i64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_ms,
            image: Some(image),
        }
    }

    pub fn missing(index: usize, timestamp_ms: i64) -> Self {
        Self {
            index,
            timestamp_ms,
            image: None,
        }
    }
}

/// Axis-aligned rectangle given by its four edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl Rect {
    pub fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// The "no match" rectangle: every edge at the origin.
    pub const fn zero() -> Self {
        Self {
            top: 0.0,
            left: 0.0,
            bottom: 0.0,
            right: 0.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// True when the rectangle covers no area (including the zero rectangle).
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Map from model-input space to display space. Horizontal edges use the
    /// width multiplier, vertical edges the height multiplier.
    pub fn scaled(&self, factors: ScaleFactors) -> Self {
        Self {
            top: self.top * factors.height_multiplier,
            left: self.left * factors.width_multiplier,
            bottom: self.bottom * factors.height_multiplier,
            right: self.right * factors.width_multiplier,
        }
    }
}

/// A single classifier result in model-input coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(rename = "box")]
    pub rect: Rect,
}

/// Best match for one frame, already in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledDetection {
    pub frame_index: usize,
    pub rect: Rect,
}

impl ScaledDetection {
    pub fn empty(frame_index: usize) -> Self {
        Self {
            frame_index,
            rect: Rect::zero(),
        }
    }

    pub fn is_match(&self) -> bool {
        !self.rect.is_empty()
    }
}

/// Pixel size of the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Ratio of display size to model input size. Snapshotted once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub width_multiplier: f32,
    pub height_multiplier: f32,
}

impl ScaleFactors {
    pub fn new(width_multiplier: f32, height_multiplier: f32) -> Self {
        Self {
            width_multiplier,
            height_multiplier,
        }
    }

    pub fn from_display(display: DisplaySize, model_width: u32, model_height: u32) -> Self {
        Self {
            width_multiplier: display.width as f32 / model_width.max(1) as f32,
            height_multiplier: display.height as f32 / model_height.max(1) as f32,
        }
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}
