//! Integration module for connecting recognition backends with the tracker.
//!
//! This module provides the `Recognizer` capability any biometric backend
//! implements, and the `TrackerPipeline` controller that drives a frame source
//! through recognition, tracking and annotation into an output sink.

mod builder;
mod pipeline;
mod recognizer;
mod replay;

pub use builder::DetectionBuilder;
pub use pipeline::{RecognitionStage, RunState, RunSummary, TerminationReason, TrackerPipeline};
pub use recognizer::{Recognition, Recognizer};
pub use replay::ReplayRecognizer;
