//! Frames and stream metadata.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::Serialize;

/// Immutable image plus its position in the source stream.
///
/// `index` counts source frames, processed or not. Cloning shares the pixel
/// buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp: Duration,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, timestamp: Duration, image: RgbImage) -> Self {
        Self {
            index,
            timestamp,
            image: Arc::new(image),
        }
    }

    /// Build a frame whose timestamp is derived from `index / fps`.
    pub fn at_rate(index: u64, fps: Option<f64>, image: RgbImage) -> Self {
        let timestamp = match fps {
            Some(fps) if fps > 0.0 => Duration::from_secs_f64(index as f64 / fps),
            _ => Duration::ZERO,
        };
        Self::new(index, timestamp, image)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// A frame with the same index and timestamp but different pixels.
    pub fn with_image(&self, image: RgbImage) -> Self {
        Self::new(self.index, self.timestamp, image)
    }
}

/// Properties reported by a source once it is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    /// Native frame rate, if the source knows it
    pub fps: Option<f64>,
    /// Total frame count for finite inputs; `None` for live streams
    pub total_frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}
