//! Frame admission and progress reporting.

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

/// How the pacer thins the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    /// Accumulates `F_tgt / F_src` per source frame and processes a frame each
    /// time the running total crosses an integer. Long-run drift stays below
    /// one frame for any ratio.
    #[default]
    Accumulator,
    /// Processes every `round(F_src / F_tgt)`-th frame. Drifts when the ratio
    /// is not integral.
    FixedInterval,
}

/// Decides which source frames are processed.
#[derive(Debug, Clone)]
pub struct FramePacer {
    mode: PacingMode,
    ratio: f64,
    interval: u64,
    last_bucket: Option<u64>,
    total_frames: Option<u64>,
    seen: u64,
    admitted: u64,
}

impl FramePacer {
    /// `target_fps` of `None`, an unknown `source_fps`, or a target at or above
    /// the source rate all mean every frame is processed.
    pub fn new(
        source_fps: Option<f64>,
        target_fps: Option<f64>,
        mode: PacingMode,
        total_frames: Option<u64>,
    ) -> Self {
        let ratio = match (source_fps, target_fps) {
            (Some(src), Some(tgt)) if src > 0.0 && tgt > 0.0 && tgt < src => tgt / src,
            _ => 1.0,
        };
        let interval = (1.0 / ratio).round().max(1.0) as u64;
        Self {
            mode,
            ratio,
            interval,
            last_bucket: None,
            total_frames: total_frames.filter(|&n| n > 0),
            seen: 0,
            admitted: 0,
        }
    }

    /// A pacer that admits every frame.
    pub fn passthrough(total_frames: Option<u64>) -> Self {
        Self::new(None, None, PacingMode::Accumulator, total_frames)
    }

    pub fn processes_every_frame(&self) -> bool {
        match self.mode {
            PacingMode::Accumulator => self.ratio >= 1.0,
            PacingMode::FixedInterval => self.interval == 1,
        }
    }

    /// Fraction of source frames expected to be processed.
    pub fn ratio(&self) -> f64 {
        match self.mode {
            PacingMode::Accumulator => self.ratio,
            PacingMode::FixedInterval => 1.0 / self.interval as f64,
        }
    }

    /// Processed-frame rate for a given source rate.
    pub fn effective_fps(&self, source_fps: f64) -> f64 {
        source_fps * self.ratio()
    }

    /// Whether the frame at `source_index` should be processed.
    pub fn admit(&mut self, source_index: u64) -> bool {
        self.seen += 1;
        let take = match self.mode {
            PacingMode::Accumulator => {
                let bucket = (source_index as f64 * self.ratio + EPSILON).floor() as u64;
                let crossed = self.last_bucket.is_none_or(|prev| bucket > prev);
                if crossed {
                    self.last_bucket = Some(bucket);
                }
                crossed
            }
            PacingMode::FixedInterval => source_index % self.interval == 0,
        };
        if take {
            self.admitted += 1;
        }
        take
    }

    /// Percent complete after `source_index`, when the total length is known.
    pub fn progress(&self, source_index: u64) -> Option<f32> {
        self.total_frames.map(|total| {
            let done = (source_index + 1).min(total);
            (done as f64 / total as f64 * 100.0) as f32
        })
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Frames offered to [`admit`](Self::admit) so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Frames admitted so far.
    pub fn admitted(&self) -> u64 {
        self.admitted
    }
}
