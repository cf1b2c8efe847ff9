//! Background decoding through a bounded queue.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, bounded};
use image::RgbImage;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::frame::SourceInfo;
use crate::io::source::FrameSource;

enum Decoded {
    Frame(RgbImage),
    Failed(SourceError),
}

/// Wraps a source so decoding runs on a worker thread, at most `depth` frames
/// ahead of the consumer.
///
/// A single producer and a FIFO channel keep frames in source order, so the
/// tracker still sees frame N before frame N+1.
pub struct PrefetchSource<S: FrameSource + Send + 'static> {
    depth: usize,
    idle: Option<S>,
    worker: Option<JoinHandle<S>>,
    rx: Option<Receiver<Decoded>>,
}

impl<S: FrameSource + Send + 'static> PrefetchSource<S> {
    pub fn new(inner: S, depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            idle: Some(inner),
            worker: None,
            rx: None,
        }
    }
}

impl<S: FrameSource + Send + 'static> FrameSource for PrefetchSource<S> {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        let Some(mut inner) = self.idle.take() else {
            return Err(SourceError::open("prefetch", "source already started"));
        };
        let info = match inner.open() {
            Ok(info) => info,
            Err(err) => {
                self.idle = Some(inner);
                return Err(err);
            }
        };

        let (tx, rx) = bounded(self.depth);
        let handle = std::thread::Builder::new()
            .name("frame-decode".to_string())
            .spawn(move || {
                loop {
                    let message = match inner.read() {
                        Ok(Some(image)) => Decoded::Frame(image),
                        Ok(None) => break,
                        Err(err) => Decoded::Failed(err),
                    };
                    // Disconnected: the consumer released us.
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                inner
            })?;

        debug!(depth = self.depth, "decode worker started");
        self.worker = Some(handle);
        self.rx = Some(rx);
        Ok(info)
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Decoded::Frame(image)) => Ok(Some(image)),
            Ok(Decoded::Failed(err)) => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn release(&mut self) {
        drop(self.rx.take());
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(inner) => self.idle = Some(inner),
                Err(_) => warn!("decode worker panicked; inner source not released"),
            }
        }
        if let Some(inner) = self.idle.as_mut() {
            inner.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VecSource;
    use image::Rgb;

    #[test]
    fn test_prefetch_preserves_order() {
        let frames = (0..20u8)
            .map(|i| RgbImage::from_pixel(2, 2, Rgb([i, 0, 0])))
            .collect();
        let mut source = PrefetchSource::new(VecSource::new(frames, None), 2);
        assert_eq!(source.open().unwrap().total_frames, Some(20));

        for expected in 0..20u8 {
            let image = source.read().unwrap().unwrap();
            assert_eq!(image.get_pixel(0, 0).0[0], expected);
        }
        assert!(source.read().unwrap().is_none());
        source.release();
    }

    #[test]
    fn test_release_before_drain_stops_worker() {
        let mut source = PrefetchSource::new(VecSource::blank(100, 2, 2, None), 1);
        source.open().unwrap();
        assert!(source.read().unwrap().is_some());
        source.release();
        assert!(source.read().unwrap().is_none());
    }
}
