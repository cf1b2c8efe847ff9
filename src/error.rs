//! Error types for the capture, output and control layers.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a [`FrameSource`](crate::io::FrameSource).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot open source {source_name}: {reason}")]
    Open { source_name: String, reason: String },

    #[error("frame {index} could not be read: {reason}")]
    Read { index: u64, reason: String },

    #[error("unsupported input source: {0}")]
    Unsupported(String),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn open<S: Into<String>, R: Into<String>>(source_name: S, reason: R) -> Self {
        Self::Open {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn read<R: Into<String>>(index: u64, reason: R) -> Self {
        Self::Read {
            index,
            reason: reason.into(),
        }
    }
}

/// Failures of a [`FrameWriter`](crate::io::FrameWriter) or [`FrameDisplay`](crate::io::FrameDisplay).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("cannot open output {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("failed to write frame {index}: {reason}")]
    Write { index: u64, reason: String },

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("target_fps must be a positive finite number, got {0}")]
    InvalidTargetFps(f64),

    #[error("source_fps must be a positive finite number, got {0}")]
    InvalidFps(f64),

    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },

    #[error("{0} must be at least 1")]
    InvalidBound(&'static str),

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of the bundled [`ReplayRecognizer`](crate::integration::ReplayRecognizer).
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("no recognition backend answer for frame {0}")]
    Unavailable(u64),

    #[error("cannot load detections: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse detections: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Conditions that end a run early.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source open failed: {0}")]
    SourceOpen(#[source] SourceError),

    #[error("output write failed: {0}")]
    OutputWrite(#[source] SinkError),

    #[error("cannot load annotation font: {0}")]
    Font(#[source] SinkError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
