//! Trait for biometric recognition backends.

use image::RgbImage;

use crate::frame::Frame;
use crate::tracker::Detection;

/// What a backend returns for one frame.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    /// The backend's own drawing of the frame, if it produces one. The overlay
    /// is rendered on top of it instead of the raw frame.
    pub annotated: Option<RgbImage>,
    pub detections: Vec<Detection>,
}

impl Recognition {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            annotated: None,
            detections,
        }
    }

    pub fn with_annotated(mut self, image: RgbImage) -> Self {
        self.annotated = Some(image);
        self
    }
}

impl From<Vec<Detection>> for Recognition {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

/// Trait for person recognition backends.
///
/// Implement this trait to connect any face/ear/body recognition model to the
/// tracking pipeline. Coordinates are absolute pixels within the given frame.
///
/// # Example
///
/// ```ignore
/// use cctv_track::{Frame, Recognition, Recognizer};
///
/// struct MyModel {
///     // Your model here
/// }
///
/// impl Recognizer for MyModel {
///     type Error = std::io::Error;
///
///     fn recognize(&mut self, frame: &Frame) -> Result<Recognition, Self::Error> {
///         // Run inference and return named detections
///         Ok(Recognition::default())
///     }
/// }
/// ```
pub trait Recognizer {
    /// Error type for recognition failures.
    type Error: std::error::Error;

    fn recognize(&mut self, frame: &Frame) -> Result<Recognition, Self::Error>;
}

impl<R: Recognizer + ?Sized> Recognizer for &mut R {
    type Error = R::Error;

    fn recognize(&mut self, frame: &Frame) -> Result<Recognition, Self::Error> {
        (**self).recognize(frame)
    }
}
