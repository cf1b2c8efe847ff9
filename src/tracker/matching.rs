//! Matching utilities for identity tracking.

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::{Rect, iou_batch};

/// Who the recognition backend thinks a person is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Identity {
    /// Detected but not matched against the enrolled database.
    #[default]
    Unknown,
    /// A resolved, enrolled name.
    Named(String),
}

impl Identity {
    pub const UNKNOWN_LABEL: &'static str = "Unknown";

    pub fn is_resolved(&self) -> bool {
        matches!(self, Identity::Named(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identity::Unknown => Self::UNKNOWN_LABEL,
            Identity::Named(name) => name,
        }
    }

    /// Two identities conflict only when both are resolved and differ.
    pub fn conflicts_with(&self, other: &Identity) -> bool {
        match (self, other) {
            (Identity::Named(a), Identity::Named(b)) => a != b,
            _ => false,
        }
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == Self::UNKNOWN_LABEL {
            Identity::Unknown
        } else {
            Identity::Named(trimmed.to_string())
        }
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Identity::from(name.as_str())
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.as_str().to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-frame observation from the recognition backend.
///
/// Carries no identity-over-time information; that is the tracker's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub name: Identity,
    /// Bounding box in absolute pixel coordinates
    pub bbox: Rect,
}

impl Detection {
    /// Create a detection from integer corner coordinates (x1, y1, x2, y2).
    pub fn new(name: impl Into<Identity>, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            name: name.into(),
            bbox: Rect::from_tlbr(x1 as f32, y1 as f32, x2 as f32, y2 as f32),
        }
    }

    pub fn from_rect(name: impl Into<Identity>, bbox: Rect) -> Self {
        Self {
            name: name.into(),
            bbox,
        }
    }
}

/// Compute the IoU matrix between track boxes (rows) and detection boxes (columns).
pub fn iou_matrix(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Greedy one-to-one assignment in descending IoU order.
///
/// Pairs with IoU below `thresh` (or with no overlap at all) are never matched.
/// Equal IoUs are broken by `prefer(track, det)` first, then by index, so the
/// result is deterministic for identical input.
pub fn greedy_assignment<F>(ious: &Array2<f32>, thresh: f32, prefer: F) -> AssignmentResult
where
    F: Fn(usize, usize) -> bool,
{
    let (num_rows, num_cols) = ious.dim();

    let mut candidates: Vec<(usize, usize, f32, bool)> = Vec::new();
    for i in 0..num_rows {
        for j in 0..num_cols {
            let iou = ious[[i, j]];
            if iou > 0.0 && iou >= thresh {
                candidates.push((i, j, iou, prefer(i, j)));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then_with(|| b.3.cmp(&a.3))
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut track_used = vec![false; num_rows];
    let mut det_used = vec![false; num_cols];
    let mut matches = Vec::new();

    for (i, j, _, _) in candidates {
        if track_used[i] || det_used[j] {
            continue;
        }
        track_used[i] = true;
        det_used[j] = true;
        matches.push((i, j));
    }

    matches.sort_unstable();

    AssignmentResult {
        matches,
        unmatched_tracks: unused(&track_used),
        unmatched_detections: unused(&det_used),
    }
}

fn unused(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &used)| if used { None } else { Some(i) })
        .collect()
}
