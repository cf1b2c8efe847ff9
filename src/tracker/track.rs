//! A single persisted identity hypothesis.

use serde::Serialize;

use crate::tracker::matching::{Detection, Identity};
use crate::tracker::rect::Rect;

/// How a track's identity moved when a detection was applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameChange {
    Unchanged,
    /// `Unknown` became a resolved name.
    Resolved,
    /// A resolved name disagreed with the track and was held back.
    Conflict { observed: String },
    /// Enough consecutive conflicting observations replaced the name.
    Renamed { previous: String },
}

/// Identity track owned by [`IdentityTracker`](crate::tracker::IdentityTracker).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Unique track identifier, never reused within a run
    pub id: u64,
    /// Last known identity
    pub name: Identity,
    /// Latest matched bounding box
    pub bbox: Rect,
    /// Source frame index of creation
    pub first_seen_frame: u64,
    /// Source frame index of the last matched detection
    pub last_seen_frame: u64,
    /// Tracker updates since creation
    pub age: u32,
    /// Consecutive updates with no matching detection
    pub missed_count: u32,
    /// Total matched detections, including the one that created the track
    pub hits: u32,
    #[serde(skip)]
    pending_name: Option<(String, u32)>,
}

impl Track {
    pub(crate) fn new(id: u64, detection: Detection, frame_index: u64) -> Self {
        Self {
            id,
            name: detection.name,
            bbox: detection.bbox,
            first_seen_frame: frame_index,
            last_seen_frame: frame_index,
            age: 0,
            missed_count: 0,
            hits: 1,
            pending_name: None,
        }
    }

    /// Whether the track was matched on the most recent update.
    pub fn is_fresh(&self) -> bool {
        self.missed_count == 0
    }

    /// On-screen label, `name#id`.
    pub fn label(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }

    pub(crate) fn apply(
        &mut self,
        detection: Detection,
        frame_index: u64,
        rename_after: Option<u32>,
    ) -> NameChange {
        self.bbox = detection.bbox;
        self.last_seen_frame = frame_index;
        self.missed_count = 0;
        self.hits += 1;
        self.age += 1;

        let observed = detection.name;
        if !observed.is_resolved() {
            return NameChange::Unchanged;
        }

        if !self.name.is_resolved() {
            self.name = observed;
            self.pending_name = None;
            return NameChange::Resolved;
        }

        if !self.name.conflicts_with(&observed) {
            self.pending_name = None;
            return NameChange::Unchanged;
        }

        self.note_conflict(String::from(observed), rename_after)
    }

    fn note_conflict(&mut self, observed: String, rename_after: Option<u32>) -> NameChange {
        let streak = match self.pending_name.take() {
            Some((pending, count)) if pending == observed => count + 1,
            _ => 1,
        };

        match rename_after {
            Some(limit) if streak >= limit => {
                let previous = std::mem::replace(&mut self.name, Identity::Named(observed));
                NameChange::Renamed {
                    previous: previous.as_str().to_string(),
                }
            }
            _ => {
                self.pending_name = Some((observed.clone(), streak));
                NameChange::Conflict { observed }
            }
        }
    }

    pub(crate) fn mark_missed(&mut self) {
        self.missed_count += 1;
        self.age += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_track() -> Track {
        Track::new(1, Detection::new("Alice", 0, 0, 10, 10), 0)
    }

    #[test]
    fn test_unknown_detection_keeps_name() {
        let mut track = alice_track();
        let change = track.apply(Detection::new("Unknown", 1, 1, 11, 11), 1, None);
        assert_eq!(change, NameChange::Unchanged);
        assert_eq!(track.name, Identity::from("Alice"));
        assert_eq!(track.bbox, Rect::from_tlbr(1.0, 1.0, 11.0, 11.0));
        assert_eq!(track.hits, 2);
    }

    #[test]
    fn test_unknown_track_resolves() {
        let mut track = Track::new(1, Detection::new("Unknown", 0, 0, 10, 10), 0);
        let change = track.apply(Detection::new("Bob", 0, 0, 10, 10), 1, None);
        assert_eq!(change, NameChange::Resolved);
        assert_eq!(track.label(), "Bob#1");
    }

    #[test]
    fn test_conflicting_name_is_held_back() {
        let mut track = alice_track();
        for frame in 1..10 {
            let change = track.apply(Detection::new("Bob", 0, 0, 10, 10), frame, None);
            assert_eq!(
                change,
                NameChange::Conflict {
                    observed: "Bob".into()
                }
            );
        }
        assert_eq!(track.name, Identity::from("Alice"));
    }

    #[test]
    fn test_rename_after_consecutive_conflicts() {
        let mut track = alice_track();
        track.apply(Detection::new("Bob", 0, 0, 10, 10), 1, Some(3));
        track.apply(Detection::new("Bob", 0, 0, 10, 10), 2, Some(3));
        let change = track.apply(Detection::new("Bob", 0, 0, 10, 10), 3, Some(3));
        assert_eq!(
            change,
            NameChange::Renamed {
                previous: "Alice".into()
            }
        );
        assert_eq!(track.name, Identity::from("Bob"));
    }

    #[test]
    fn test_agreeing_observation_resets_conflict_streak() {
        let mut track = alice_track();
        track.apply(Detection::new("Bob", 0, 0, 10, 10), 1, Some(2));
        track.apply(Detection::new("Alice", 0, 0, 10, 10), 2, Some(2));
        let change = track.apply(Detection::new("Bob", 0, 0, 10, 10), 3, Some(2));
        assert!(matches!(change, NameChange::Conflict { .. }));
        assert_eq!(track.name, Identity::from("Alice"));
    }

    #[test]
    fn test_mark_missed_ages_track() {
        let mut track = alice_track();
        track.mark_missed();
        track.mark_missed();
        assert_eq!(track.missed_count, 2);
        assert_eq!(track.age, 2);
        assert!(!track.is_fresh());
    }
}
