//! Output sinks: a video writer and/or a live display.

use tracing::{error, info, warn};

use crate::error::SinkError;
use crate::frame::{Frame, SourceInfo};

/// Persists annotated frames.
pub trait FrameWriter {
    /// `fps` is the rate at which frames will be written.
    fn open(&mut self, info: &SourceInfo, fps: f64) -> Result<(), SinkError>;

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    fn release(&mut self);
}

/// Shows frames live and reports user interrupts.
pub trait FrameDisplay {
    fn open(&mut self, info: &SourceInfo) -> Result<(), SinkError>;

    fn show(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Polled once per loop iteration, e.g. for a quit key.
    fn cancel_requested(&mut self) -> bool {
        false
    }

    fn release(&mut self);
}

/// Which outputs a frame goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub writer: bool,
    pub display: bool,
}

/// Writer and display composed behind one handle that owns their release.
///
/// A writer failure disables the writer only. When no output remains after
/// that, the failure is returned as unrecoverable. A display that is attached
/// but not enabled at [`open`](Self::open) is detached and never receives
/// frames.
#[derive(Default)]
pub struct OutputSink {
    writer: Option<Box<dyn FrameWriter>>,
    display: Option<Box<dyn FrameDisplay>>,
    writer_failed: bool,
    released: bool,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(mut self, writer: impl FrameWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn with_display(mut self, display: impl FrameDisplay + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some() && !self.writer_failed
    }

    pub fn has_display(&self) -> bool {
        self.display.is_some()
    }

    pub fn writer_failed(&self) -> bool {
        self.writer_failed
    }

    /// Whether any output is still receiving frames.
    pub fn is_active(&self) -> bool {
        self.has_writer() || self.has_display()
    }

    pub fn open(
        &mut self,
        info: &SourceInfo,
        writer_fps: f64,
        display_enabled: bool,
    ) -> Result<(), SinkError> {
        if !display_enabled && self.display.take().is_some() {
            info!("display disabled, detaching it");
        }
        let display_result = self.display.as_mut().map(|display| display.open(info));
        if let Some(Err(err)) = display_result {
            warn!(%err, "display unavailable, continuing without it");
            self.display = None;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.open(info, writer_fps) {
                self.writer_failed = true;
                if !self.has_display() {
                    error!(%err, "output writer could not be opened");
                    return Err(err);
                }
                warn!(%err, "output writer could not be opened, display continues");
            }
        }
        Ok(())
    }

    pub fn emit(&mut self, frame: &Frame, route: Route) -> Result<(), SinkError> {
        if route.display {
            if let Some(display) = self.display.as_mut() {
                if let Err(err) = display.show(frame) {
                    warn!(index = frame.index, %err, "display failed to show frame");
                }
            }
        }

        if route.writer && self.has_writer() {
            if let Some(writer) = self.writer.as_mut() {
                if let Err(err) = writer.write(frame) {
                    self.writer_failed = true;
                    if !self.has_display() {
                        error!(index = frame.index, %err, "output writer failed");
                        return Err(err);
                    }
                    warn!(index = frame.index, %err, "output writer failed, display continues");
                }
            }
        }
        Ok(())
    }

    pub fn cancel_requested(&mut self) -> bool {
        self.display
            .as_mut()
            .is_some_and(|display| display.cancel_requested())
    }

    /// Release every attached output. Later calls are no-ops.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.release();
        }
        if let Some(display) = self.display.as_mut() {
            display.release();
        }
        info!("output released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct Log {
        written: usize,
        shown: usize,
        released: usize,
    }

    struct FailingWriter(Rc<RefCell<Log>>);

    impl FrameWriter for FailingWriter {
        fn open(&mut self, _: &SourceInfo, _: f64) -> Result<(), SinkError> {
            Ok(())
        }
        fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
            self.0.borrow_mut().written += 1;
            Err(SinkError::Write {
                index: frame.index,
                reason: "disk full".into(),
            })
        }
        fn release(&mut self) {
            self.0.borrow_mut().released += 1;
        }
    }

    struct CountingDisplay(Rc<RefCell<Log>>);

    impl FrameDisplay for CountingDisplay {
        fn open(&mut self, _: &SourceInfo) -> Result<(), SinkError> {
            Ok(())
        }
        fn show(&mut self, _: &Frame) -> Result<(), SinkError> {
            self.0.borrow_mut().shown += 1;
            Ok(())
        }
        fn release(&mut self) {
            self.0.borrow_mut().released += 1;
        }
    }

    fn info() -> SourceInfo {
        SourceInfo {
            name: "test".into(),
            fps: Some(30.0),
            total_frames: None,
            width: 2,
            height: 2,
        }
    }

    fn frame() -> Frame {
        Frame::new(0, Duration::ZERO, RgbImage::new(2, 2))
    }

    const BOTH: Route = Route {
        writer: true,
        display: true,
    };

    #[test]
    fn test_writer_failure_with_display_is_recoverable() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = OutputSink::new()
            .with_writer(FailingWriter(log.clone()))
            .with_display(CountingDisplay(log.clone()));
        sink.open(&info(), 30.0, true).unwrap();

        sink.emit(&frame(), BOTH).unwrap();
        sink.emit(&frame(), BOTH).unwrap();
        assert!(sink.writer_failed());
        assert!(sink.is_active());
        // Writer is not retried after failing.
        assert_eq!(log.borrow().written, 1);
        assert_eq!(log.borrow().shown, 2);
    }

    #[test]
    fn test_writer_failure_alone_is_fatal() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = OutputSink::new().with_writer(FailingWriter(log.clone()));
        sink.open(&info(), 30.0, true).unwrap();
        assert!(sink.emit(&frame(), BOTH).is_err());
        assert!(!sink.is_active());
    }

    #[test]
    fn test_disabled_display_is_not_an_output() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = OutputSink::new()
            .with_writer(FailingWriter(log.clone()))
            .with_display(CountingDisplay(log.clone()));
        sink.open(&info(), 30.0, false).unwrap();
        assert!(!sink.has_display());

        assert!(sink.emit(&frame(), BOTH).is_err());
        assert!(!sink.is_active());
        assert_eq!(log.borrow().shown, 0);

        sink.release();
        // Only the writer is released; the display was never opened.
        assert_eq!(log.borrow().released, 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = OutputSink::new()
            .with_writer(FailingWriter(log.clone()))
            .with_display(CountingDisplay(log.clone()));
        sink.release();
        sink.release();
        assert_eq!(log.borrow().released, 2);
    }
}
