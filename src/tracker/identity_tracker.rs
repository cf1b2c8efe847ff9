//! Greedy IoU identity tracker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::{NameChange, Track};

/// Configuration for the IdentityTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a track/detection pair to be eligible
    pub iou_threshold: f32,
    /// Consecutive missed updates tolerated before a track is evicted
    pub eviction_threshold: u32,
    /// Consecutive conflicting resolved names needed to rename a track.
    /// `None` keeps the first resolved name for the whole track lifetime.
    pub rename_after: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            eviction_threshold: 30,
            rename_after: None,
        }
    }
}

/// Counters accumulated over the tracker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub updates: u64,
    pub tracks_created: u64,
    pub tracks_evicted: u64,
    pub detections_dropped: u64,
    pub name_conflicts: u64,
}

/// Assigns stable IDs to per-frame detections.
///
/// Called once per processed frame; skipped frames leave the state untouched.
pub struct IdentityTracker {
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
    last_frame: Option<u64>,
    evicted: Vec<u64>,
    stats: TrackerStats,
    config: TrackerConfig,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            last_frame: None,
            evicted: Vec::new(),
            stats: TrackerStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Number of live tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Live tracks ordered by ID.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// IDs evicted by the most recent update.
    pub fn last_evicted(&self) -> &[u64] {
        &self.evicted
    }

    pub fn update(&mut self, detections: Vec<Detection>, frame_index: u64) -> Vec<Track> {
        if let Some(last) = self.last_frame.filter(|&last| frame_index <= last) {
            warn!(frame_index, last, "tracker update out of frame order");
        }
        self.last_frame = Some(frame_index);
        self.stats.updates += 1;
        self.evicted.clear();

        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|det| {
                let ok = det.bbox.is_well_formed();
                if !ok {
                    warn!(frame_index, name = %det.name, bbox = ?det.bbox, "dropping malformed detection");
                    self.stats.detections_dropped += 1;
                }
                ok
            })
            .collect();

        // Step 1: IoU between every live track and every detection
        let ids: Vec<u64> = self.tracks.keys().copied().collect();
        let track_rects: Vec<Rect> = self.tracks.values().map(|t| t.bbox).collect();
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let ious = matching::iou_matrix(&track_rects, &det_rects);

        // Step 2-3: greedy one-to-one assignment, agreeing names win ties
        let names_agree = |i: usize, j: usize| {
            self.tracks
                .get(&ids[i])
                .is_some_and(|t| t.name.is_resolved() && t.name == detections[j].name)
        };
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::greedy_assignment(&ious, self.config.iou_threshold, names_agree);

        let mut detections: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();

        // Step 4: apply matched detections
        for (itrack, idet) in matches {
            let Some(det) = detections[idet].take() else {
                continue;
            };
            let Some(track) = self.tracks.get_mut(&ids[itrack]) else {
                continue;
            };
            match track.apply(det, frame_index, self.config.rename_after) {
                NameChange::Unchanged => {}
                NameChange::Resolved => {
                    debug!(id = track.id, name = %track.name, "track identity resolved");
                }
                NameChange::Conflict { observed } => {
                    self.stats.name_conflicts += 1;
                    debug!(id = track.id, name = %track.name, %observed, "conflicting name ignored");
                }
                NameChange::Renamed { previous } => {
                    self.stats.name_conflicts += 1;
                    debug!(id = track.id, %previous, name = %track.name, "track renamed");
                }
            }
        }

        // Step 5: unmatched detections become new tracks
        for idet in unmatched_detections {
            let Some(det) = detections[idet].take() else {
                continue;
            };
            let id = self.next_id;
            self.next_id += 1;
            self.stats.tracks_created += 1;
            debug!(id, name = %det.name, frame_index, "track created");
            self.tracks.insert(id, Track::new(id, det, frame_index));
        }

        // Step 6: unmatched tracks age and may be evicted
        for itrack in unmatched_tracks {
            let id = ids[itrack];
            let Some(track) = self.tracks.get_mut(&id) else {
                continue;
            };
            track.mark_missed();
            if track.missed_count > self.config.eviction_threshold {
                debug!(id, name = %track.name, missed = track.missed_count, "track evicted");
                self.tracks.remove(&id);
                self.evicted.push(id);
                self.stats.tracks_evicted += 1;
            }
        }

        self.tracks.values().cloned().collect()
    }
}
