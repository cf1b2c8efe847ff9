//! Frame pacing and persistent identity tracking for video streams annotated
//! by an external person-recognition backend.
//!
//! The [`TrackerPipeline`] reads frames from a [`io::FrameSource`], lets the
//! [`FramePacer`] decide which ones to process, hands processed frames to a
//! [`Recognizer`], feeds the detections to the [`IdentityTracker`] and emits
//! annotated frames to an [`io::OutputSink`].

pub mod annotate;
pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod integration;
pub mod io;
pub mod pacer;
pub mod tracker;

pub use annotate::{AnnotationStyle, Overlay, Renderer, annotate};
pub use cancel::{CancelSignal, CancellationToken, NeverCancel};
pub use config::{InputSource, PipelineConfig};
pub use error::{ConfigError, PipelineError, RecognitionError, SinkError, SourceError};
pub use frame::{Frame, SourceInfo};
pub use integration::{
    DetectionBuilder, Recognition, RecognitionStage, Recognizer, ReplayRecognizer,
    RunState, RunSummary, TerminationReason, TrackerPipeline,
};
pub use pacer::{FramePacer, PacingMode};
pub use tracker::{Detection, Identity, IdentityTracker, Rect, Track, TrackerConfig};
