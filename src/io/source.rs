//! Frame source abstraction.

use image::RgbImage;

use crate::error::SourceError;
use crate::frame::SourceInfo;

/// A capture device or file yielding raw frames in source order.
///
/// The controller calls [`open`](FrameSource::open) once, then
/// [`read`](FrameSource::read) until it returns `Ok(None)`, and always finishes
/// with exactly one [`release`](FrameSource::release), whatever happened in
/// between.
pub trait FrameSource {
    fn open(&mut self) -> Result<SourceInfo, SourceError>;

    /// Next frame, `Ok(None)` at end of stream. An `Err` means this one frame
    /// was lost; later reads may still succeed.
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError>;

    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// In-memory frames, for synthetic runs and tests.
#[derive(Debug, Clone)]
pub struct VecSource {
    frames: std::vec::IntoIter<RgbImage>,
    fps: Option<f64>,
    total: u64,
    width: u32,
    height: u32,
}

impl VecSource {
    pub fn new(frames: Vec<RgbImage>, fps: Option<f64>) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            total: frames.len() as u64,
            frames: frames.into_iter(),
            fps,
            width,
            height,
        }
    }

    /// `count` blank frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32, fps: Option<f64>) -> Self {
        Self::new(vec![RgbImage::new(width, height); count], fps)
    }
}

impl FrameSource for VecSource {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        Ok(SourceInfo {
            name: "memory".to_string(),
            fps: self.fps,
            total_frames: Some(self.total),
            width: self.width,
            height: self.height,
        })
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        Ok(self.frames.next())
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_reports_and_drains() {
        let mut source = VecSource::blank(3, 8, 6, Some(15.0));
        let info = source.open().unwrap();
        assert_eq!(info.total_frames, Some(3));
        assert_eq!((info.width, info.height), (8, 6));

        let mut count = 0;
        while let Some(frame) = source.read().unwrap() {
            assert_eq!(frame.dimensions(), (8, 6));
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
