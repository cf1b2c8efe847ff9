//! TrackerPipeline: the capture -> recognize -> track -> annotate -> emit loop.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::annotate::{Renderer, annotate};
use crate::cancel::{CancelSignal, NeverCancel};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::io::{FrameSource, OutputSink, Route};
use crate::pacer::FramePacer;
use crate::tracker::{Detection, IdentityTracker, Track};

use super::{Recognition, Recognizer};

/// Writer rate used when neither the source nor the config knows one.
const FALLBACK_FPS: f64 = 30.0;

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Running,
    EndOfStream,
    Cancelled,
    Shutdown,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    EndOfStream,
    Cancelled,
    SourceOpenFailure,
    /// The writer failed and no display remained to receive frames.
    OutputFailure,
}

/// Final report of a run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub termination: TerminationReason,
    /// Frames read successfully from the source
    pub frames_seen: u64,
    pub frames_processed: u64,
    /// Tracker updates applied; equals `frames_processed` for a full run
    pub tracker_updates: u64,
    pub read_failures: u64,
    pub recognition_failures: u64,
    pub detections_dropped: u64,
    pub peak_tracks: usize,
    pub tracks_created: u64,
    pub tracks_evicted: u64,
    /// Tracks still live when the run ended
    pub final_tracks: Vec<Track>,
    pub elapsed_secs: f64,
    /// Lifecycle states in the order they were entered
    pub states: Vec<RunState>,
    #[serde(skip)]
    pub error: Option<PipelineError>,
}

impl RunSummary {
    pub fn live_tracks(&self) -> usize {
        self.final_tracks.len()
    }

    /// Processed frames per second of wall time.
    pub fn average_fps(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.frames_processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.termination,
            TerminationReason::EndOfStream | TerminationReason::Cancelled
        )
    }
}

/// Recognition, tracking and annotation of single frames.
///
/// Owns the tracker; no other component mutates track state.
pub struct RecognitionStage<R: Recognizer> {
    recognizer: R,
    tracker: IdentityTracker,
    renderer: Renderer,
    config: PipelineConfig,
    frames_processed: u64,
    recognition_failures: u64,
    consecutive_failures: u32,
    detections_dropped: u64,
    peak_tracks: usize,
}

impl<R: Recognizer> RecognitionStage<R> {
    pub fn new(recognizer: R, renderer: Renderer, config: PipelineConfig) -> Self {
        Self {
            recognizer,
            tracker: IdentityTracker::new(config.tracker.clone()),
            renderer,
            config,
            frames_processed: 0,
            recognition_failures: 0,
            consecutive_failures: 0,
            detections_dropped: 0,
            peak_tracks: 0,
        }
    }

    /// Discard all track state and counters.
    pub fn reset(&mut self) {
        self.tracker = IdentityTracker::new(self.config.tracker.clone());
        self.frames_processed = 0;
        self.recognition_failures = 0;
        self.consecutive_failures = 0;
        self.detections_dropped = 0;
        self.peak_tracks = 0;
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }

    /// Run one processed frame through the backend and tracker and return the
    /// annotated frame.
    ///
    /// A backend failure counts as a frame with no detections, so existing
    /// tracks simply miss.
    pub fn process(&mut self, frame: &Frame, progress: Option<f32>) -> Frame {
        let recognition = match self.recognizer.recognize(frame) {
            Ok(recognition) => {
                self.consecutive_failures = 0;
                recognition
            }
            Err(err) => {
                self.recognition_failures += 1;
                self.consecutive_failures += 1;
                let alarm = self.config.recognition_failure_alarm.max(1);
                if self.consecutive_failures % alarm == 0 {
                    error!(
                        index = frame.index,
                        consecutive = self.consecutive_failures,
                        %err,
                        "recognition keeps failing"
                    );
                } else {
                    warn!(index = frame.index, %err, "recognition failed, treating frame as empty");
                }
                Recognition::default()
            }
        };

        let detections = self.sanitize(recognition.detections, frame);
        let tracks = self.tracker.update(detections, frame.index);
        self.frames_processed += 1;
        self.peak_tracks = self.peak_tracks.max(tracks.len());

        let overlay = annotate(
            frame.index,
            frame.width(),
            frame.height(),
            &tracks,
            progress,
            self.renderer.style(),
        );
        let mut canvas = match recognition.annotated {
            Some(image) if image.dimensions() == frame.image().dimensions() => image,
            Some(image) => {
                warn!(
                    index = frame.index,
                    got = ?image.dimensions(),
                    "backend drawing has wrong size, using raw frame"
                );
                frame.image().clone()
            }
            None => frame.image().clone(),
        };
        self.renderer.render(&mut canvas, &overlay);

        debug!(index = frame.index, tracks = tracks.len(), "frame processed");
        frame.with_image(canvas)
    }

    fn sanitize(&mut self, detections: Vec<Detection>, frame: &Frame) -> Vec<Detection> {
        let (width, height) = (frame.width(), frame.height());
        detections
            .into_iter()
            .filter_map(|det| match det.bbox.clamp_to(width, height) {
                Some(bbox) => Some(Detection { bbox, ..det }),
                None => {
                    warn!(index = frame.index, name = %det.name, bbox = ?det.bbox, "dropping detection outside frame");
                    self.detections_dropped += 1;
                    None
                }
            })
            .collect()
    }
}

/// Source and sink handles, released together.
struct Resources<S: FrameSource> {
    source: S,
    sink: OutputSink,
}

/// Releases the run's resources exactly once, on every exit path including
/// unwinding out of a panicking backend.
struct ReleaseGuard<'a, S: FrameSource> {
    io: &'a mut Resources<S>,
    released: bool,
}

impl<'a, S: FrameSource> ReleaseGuard<'a, S> {
    fn new(io: &'a mut Resources<S>) -> Self {
        Self {
            io,
            released: false,
        }
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        self.io.source.release();
        self.io.sink.release();
    }
}

impl<S: FrameSource> Drop for ReleaseGuard<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A combined runner that binds a recognition backend, a frame source and an
/// output sink to the identity tracker.
pub struct TrackerPipeline<R: Recognizer, S: FrameSource, C: CancelSignal = NeverCancel> {
    stage: RecognitionStage<R>,
    io: Resources<S>,
    cancel: C,
    config: PipelineConfig,
}

impl<R: Recognizer, S: FrameSource> TrackerPipeline<R, S, NeverCancel> {
    /// Create a pipeline; fails on invalid configuration or an unloadable font.
    pub fn new(
        recognizer: R,
        source: S,
        sink: OutputSink,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let renderer =
            Renderer::from_style(config.annotation.clone()).map_err(PipelineError::Font)?;
        if !renderer.has_font() {
            info!("no annotation font configured, labels will not be rasterized");
        }
        Ok(Self {
            stage: RecognitionStage::new(recognizer, renderer, config.clone()),
            io: Resources { source, sink },
            cancel: NeverCancel,
            config,
        })
    }

    /// Create a pipeline with default configuration.
    pub fn with_default_config(
        recognizer: R,
        source: S,
        sink: OutputSink,
    ) -> Result<Self, PipelineError> {
        Self::new(recognizer, source, sink, PipelineConfig::default())
    }
}

impl<R: Recognizer, S: FrameSource, C: CancelSignal> TrackerPipeline<R, S, C> {
    /// Replace the cancellation signal polled once per iteration.
    pub fn with_cancel<C2: CancelSignal>(self, cancel: C2) -> TrackerPipeline<R, S, C2> {
        TrackerPipeline {
            stage: self.stage,
            io: self.io,
            cancel,
            config: self.config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a single frame outside of [`run`](Self::run).
    pub fn process_frame(&mut self, frame: &Frame, progress: Option<f32>) -> Frame {
        self.stage.process(frame, progress)
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &IdentityTracker {
        self.stage.tracker()
    }

    /// Get a reference to the underlying recognizer.
    pub fn recognizer(&self) -> &R {
        self.stage.recognizer()
    }

    /// Get a mutable reference to the underlying recognizer.
    pub fn recognizer_mut(&mut self) -> &mut R {
        self.stage.recognizer_mut()
    }

    pub fn source(&self) -> &S {
        &self.io.source
    }

    /// Drive the source to completion or cancellation.
    ///
    /// Track state starts empty and resources are released before this
    /// returns, however the run ends.
    pub fn run(&mut self) -> RunSummary {
        let started = Instant::now();
        let mut states = vec![RunState::Init];
        let mut frames_seen = 0u64;
        let mut read_failures = 0u64;
        let mut fatal: Option<PipelineError> = None;

        self.stage.reset();
        let config = &self.config;
        let stage = &mut self.stage;
        let cancel = &self.cancel;
        let mut guard = ReleaseGuard::new(&mut self.io);

        info!(input = %config.input_source, "run starting");
        let termination = 'run: {
            let info = match guard.io.source.open() {
                Ok(info) => info,
                Err(err) => {
                    error!(%err, "cannot open frame source");
                    fatal = Some(PipelineError::SourceOpen(err));
                    break 'run TerminationReason::SourceOpenFailure;
                }
            };

            let fps = info.fps.or(config.source_fps);
            let mut pacer = FramePacer::new(fps, config.target_fps, config.pacing, info.total_frames);
            let native_fps = fps.unwrap_or(FALLBACK_FPS);
            let writer_fps = if config.write_skipped_frames {
                native_fps
            } else {
                pacer.effective_fps(native_fps)
            };
            info!(
                source = %info.name,
                native_fps = ?fps,
                total_frames = ?info.total_frames,
                processing_fps = pacer.effective_fps(native_fps),
                ratio = pacer.ratio(),
                "source opened"
            );

            if config.display_enabled && !guard.io.sink.has_display() {
                warn!("display requested but no display backend is attached");
            }
            if let Err(err) = guard.io.sink.open(&info, writer_fps, config.display_enabled) {
                fatal = Some(PipelineError::OutputWrite(err));
                break 'run TerminationReason::OutputFailure;
            }

            states.push(RunState::Running);
            let mut next_index = 0u64;
            let mut consecutive_read_failures = 0u32;
            let mut last_annotated: Option<Frame> = None;

            loop {
                let index = next_index;
                next_index += 1;

                match guard.io.source.read() {
                    Ok(None) => {
                        states.push(RunState::EndOfStream);
                        break 'run TerminationReason::EndOfStream;
                    }
                    Err(err) => {
                        read_failures += 1;
                        consecutive_read_failures += 1;
                        warn!(index, %err, "frame read failed, skipping");
                        if consecutive_read_failures >= config.max_consecutive_read_failures {
                            warn!(
                                consecutive = consecutive_read_failures,
                                "too many consecutive read failures, ending stream"
                            );
                            states.push(RunState::EndOfStream);
                            break 'run TerminationReason::EndOfStream;
                        }
                    }
                    Ok(Some(image)) => {
                        consecutive_read_failures = 0;
                        frames_seen += 1;
                        let frame = Frame::at_rate(index, fps, image);

                        let emitted = if pacer.admit(index) {
                            let annotated = stage.process(&frame, pacer.progress(index));
                            let route = Route {
                                writer: true,
                                display: config.display_enabled,
                            };
                            let result = guard.io.sink.emit(&annotated, route);
                            last_annotated = Some(annotated);
                            result
                        } else {
                            let route = Route {
                                writer: config.write_skipped_frames,
                                display: config.display_enabled,
                            };
                            match &last_annotated {
                                Some(last) if route.writer || route.display => {
                                    guard.io.sink.emit(last, route)
                                }
                                _ => Ok(()),
                            }
                        };

                        if let Err(err) = emitted {
                            fatal = Some(PipelineError::OutputWrite(err));
                            break 'run TerminationReason::OutputFailure;
                        }
                    }
                }

                if cancel.is_cancelled() || guard.io.sink.cancel_requested() {
                    info!(index, "cancellation requested");
                    states.push(RunState::Cancelled);
                    break 'run TerminationReason::Cancelled;
                }
            }
        };

        states.push(RunState::Shutdown);
        guard.release();
        drop(guard);
        states.push(RunState::Terminated);

        let stats = stage.tracker.stats();
        let summary = RunSummary {
            termination,
            frames_seen,
            frames_processed: stage.frames_processed,
            tracker_updates: stats.updates,
            read_failures,
            recognition_failures: stage.recognition_failures,
            detections_dropped: stage.detections_dropped + stats.detections_dropped,
            peak_tracks: stage.peak_tracks,
            tracks_created: stats.tracks_created,
            tracks_evicted: stats.tracks_evicted,
            final_tracks: stage.tracker.tracks().cloned().collect(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            states,
            error: fatal,
        };

        info!(
            termination = ?summary.termination,
            frames_seen = summary.frames_seen,
            frames_processed = summary.frames_processed,
            peak_tracks = summary.peak_tracks,
            live_tracks = summary.live_tracks(),
            elapsed_secs = summary.elapsed_secs,
            average_fps = summary.average_fps(),
            "run finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::AnnotationStyle;
    use crate::io::VecSource;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    struct MockRecognizer {
        detections: Vec<Detection>,
    }

    impl Recognizer for MockRecognizer {
        type Error = std::convert::Infallible;

        fn recognize(&mut self, _frame: &Frame) -> Result<Recognition, Self::Error> {
            Ok(Recognition::new(self.detections.clone()))
        }
    }

    #[test]
    fn test_tracker_pipeline() {
        let recognizer = MockRecognizer {
            detections: vec![Detection::new("Alice", 10, 20, 50, 80)],
        };

        let mut pipeline = TrackerPipeline::with_default_config(
            recognizer,
            VecSource::blank(4, 64, 96, Some(30.0)),
            OutputSink::new(),
        )
        .unwrap();
        let summary = pipeline.run();

        assert_eq!(summary.termination, TerminationReason::EndOfStream);
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.tracker_updates, 4);
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.final_tracks[0].label(), "Alice#1");
    }

    /// Returns its own blue drawing of the frame alongside one detection.
    struct CanvasRecognizer {
        size: (u32, u32),
    }

    impl Recognizer for CanvasRecognizer {
        type Error = std::convert::Infallible;

        fn recognize(&mut self, _frame: &Frame) -> Result<Recognition, Self::Error> {
            let (width, height) = self.size;
            let canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 255]));
            Ok(Recognition::new(vec![Detection::new("Alice", 10, 10, 40, 40)]).with_annotated(canvas))
        }
    }

    fn stage_output(size: (u32, u32)) -> Frame {
        let renderer = Renderer::new(AnnotationStyle::default(), None);
        let mut stage = RecognitionStage::new(
            CanvasRecognizer { size },
            renderer,
            PipelineConfig::default(),
        );
        let frame = Frame::new(0, Duration::ZERO, RgbImage::new(64, 64));
        stage.process(&frame, None)
    }

    #[test]
    fn test_overlay_drawn_on_backend_canvas() {
        let out = stage_output((64, 64));
        assert_eq!(out.image().dimensions(), (64, 64));
        // Untouched pixels come from the backend's drawing.
        assert_eq!(*out.image().get_pixel(60, 5), Rgb([0, 0, 255]));
        assert_eq!(
            *out.image().get_pixel(10, 10),
            Rgb(AnnotationStyle::default().named_color)
        );
    }

    #[test]
    fn test_wrong_size_canvas_falls_back_to_raw_frame() {
        let out = stage_output((32, 32));
        assert_eq!(out.image().dimensions(), (64, 64));
        assert_eq!(*out.image().get_pixel(60, 5), Rgb([0, 0, 0]));
        assert_eq!(
            *out.image().get_pixel(10, 10),
            Rgb(AnnotationStyle::default().named_color)
        );
    }

    #[test]
    fn test_detections_clipped_to_frame() {
        let recognizer = MockRecognizer {
            detections: vec![
                Detection::new("Alice", 50, 50, 200, 200),
                Detection::new("Bob", 500, 500, 600, 600),
            ],
        };
        let mut pipeline = TrackerPipeline::with_default_config(
            recognizer,
            VecSource::blank(1, 100, 100, None),
            OutputSink::new(),
        )
        .unwrap();
        let summary = pipeline.run();

        assert_eq!(summary.detections_dropped, 1);
        assert_eq!(summary.final_tracks.len(), 1);
        assert_eq!(summary.final_tracks[0].bbox.to_tlbr(), [50.0, 50.0, 100.0, 100.0]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            target_fps: Some(0.0),
            ..PipelineConfig::default()
        };
        let result = TrackerPipeline::new(
            MockRecognizer { detections: vec![] },
            VecSource::blank(1, 4, 4, None),
            OutputSink::new(),
            config,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
