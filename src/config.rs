//! Run configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotationStyle;
use crate::error::ConfigError;
use crate::pacer::PacingMode;
use crate::tracker::TrackerConfig;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// A file or directory on disk
    Path(PathBuf),
    /// A capture device number, written `device:N`
    Device(u32),
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Path(PathBuf::new())
    }
}

impl FromStr for InputSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.strip_prefix("device:").map(str::parse::<u32>) {
            Some(Ok(device)) => InputSource::Device(device),
            _ => InputSource::Path(PathBuf::from(s)),
        })
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(path) => write!(f, "{}", path.display()),
            InputSource::Device(device) => write!(f, "device:{device}"),
        }
    }
}

/// Read-only configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_source: InputSource,
    pub output_path: Option<PathBuf>,
    /// `None` processes every source frame
    pub target_fps: Option<f64>,
    pub display_enabled: bool,
    pub pacing: PacingMode,
    /// Rate assumed for sources that cannot report one
    pub source_fps: Option<f64>,
    /// Repeat the last annotated frame to the writer for skipped frames, so the
    /// written video keeps the source rate
    pub write_skipped_frames: bool,
    pub max_consecutive_read_failures: u32,
    /// Recognition failures in a row before they are logged as errors
    pub recognition_failure_alarm: u32,
    /// Capacity of the background decode queue; `None` decodes inline
    pub prefetch_depth: Option<usize>,
    pub tracker: TrackerConfig,
    pub annotation: AnnotationStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_source: InputSource::default(),
            output_path: None,
            target_fps: None,
            display_enabled: false,
            pacing: PacingMode::default(),
            source_fps: None,
            write_skipped_frames: false,
            max_consecutive_read_failures: 5,
            recognition_failure_alarm: 10,
            prefetch_depth: None,
            tracker: TrackerConfig::default(),
            annotation: AnnotationStyle::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |fps: f64| fps.is_finite() && fps > 0.0;
        if let Some(fps) = self.target_fps.filter(|&fps| !positive(fps)) {
            return Err(ConfigError::InvalidTargetFps(fps));
        }
        if let Some(fps) = self.source_fps.filter(|&fps| !positive(fps)) {
            return Err(ConfigError::InvalidFps(fps));
        }
        let iou = self.tracker.iou_threshold;
        if !(0.0..=1.0).contains(&iou) {
            return Err(ConfigError::InvalidThreshold {
                name: "tracker.iou_threshold",
                value: iou,
            });
        }
        if self.tracker.rename_after == Some(0) {
            return Err(ConfigError::InvalidBound("tracker.rename_after"));
        }
        if self.max_consecutive_read_failures == 0 {
            return Err(ConfigError::InvalidBound("max_consecutive_read_failures"));
        }
        if self.recognition_failure_alarm == 0 {
            return Err(ConfigError::InvalidBound("recognition_failure_alarm"));
        }
        if self.prefetch_depth == Some(0) {
            return Err(ConfigError::InvalidBound("prefetch_depth"));
        }
        Ok(())
    }
}
