mod identity_tracker;
mod matching;
mod rect;
mod track;

pub use identity_tracker::{IdentityTracker, TrackerConfig, TrackerStats};
pub use matching::{AssignmentResult, Detection, Identity, greedy_assignment, iou_matrix};
pub use rect::{Rect, iou_batch};
pub use track::{NameChange, Track};
