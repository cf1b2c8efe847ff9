//! Recognition results replayed from a recording.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::RecognitionError;
use crate::frame::Frame;
use crate::integration::recognizer::{Recognition, Recognizer};
use crate::tracker::Detection;

#[derive(Debug, Clone, Deserialize)]
struct RecordedDetection {
    #[serde(default)]
    name: String,
    bbox: [i32; 4],
}

/// Serves detections recorded per source frame index, e.g. from an offline run
/// of the real biometric model.
///
/// The JSON document maps frame indices to detection lists:
///
/// ```json
/// { "0": [{ "name": "Alice", "bbox": [10, 10, 50, 50] }], "3": [] }
/// ```
///
/// Frames absent from the recording yield no detections, or an error when
/// the recognizer is strict.
#[derive(Debug, Clone, Default)]
pub struct ReplayRecognizer {
    frames: BTreeMap<u64, Vec<Detection>>,
    strict: bool,
}

impl ReplayRecognizer {
    pub fn new(frames: BTreeMap<u64, Vec<Detection>>) -> Self {
        Self {
            frames,
            strict: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RecognitionError> {
        let recorded: BTreeMap<u64, Vec<RecordedDetection>> = serde_json::from_str(json)?;
        let frames = recorded
            .into_iter()
            .map(|(index, dets)| {
                let dets = dets
                    .into_iter()
                    .map(|d| {
                        let [x1, y1, x2, y2] = d.bbox;
                        Detection::new(d.name, x1, y1, x2, y2)
                    })
                    .collect();
                (index, dets)
            })
            .collect();
        Ok(Self::new(frames))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Treat frames missing from the recording as backend failures.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Recognizer for ReplayRecognizer {
    type Error = RecognitionError;

    fn recognize(&mut self, frame: &Frame) -> Result<Recognition, Self::Error> {
        match self.frames.get(&frame.index) {
            Some(dets) => Ok(Recognition::new(dets.clone())),
            None if self.strict => Err(RecognitionError::Unavailable(frame.index)),
            None => Ok(Recognition::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Identity;
    use image::RgbImage;
    use std::time::Duration;

    const RECORDING: &str = r#"{
        "0": [{"name": "Alice", "bbox": [10, 10, 50, 50]}, {"bbox": [60, 60, 80, 90]}],
        "2": [{"name": "Unknown", "bbox": [0, 0, 20, 20]}]
    }"#;

    fn frame(index: u64) -> Frame {
        Frame::new(index, Duration::ZERO, RgbImage::new(1, 1))
    }

    #[test]
    fn test_replays_recorded_frames() {
        let mut recognizer = ReplayRecognizer::from_json_str(RECORDING).unwrap();
        assert_eq!(recognizer.len(), 2);

        let first = recognizer.recognize(&frame(0)).unwrap();
        assert_eq!(first.detections.len(), 2);
        assert_eq!(first.detections[0].name, Identity::from("Alice"));
        assert_eq!(first.detections[1].name, Identity::Unknown);

        assert!(recognizer.recognize(&frame(1)).unwrap().detections.is_empty());
    }

    #[test]
    fn test_strict_mode_reports_gaps() {
        let mut recognizer = ReplayRecognizer::from_json_str(RECORDING).unwrap().strict(true);
        assert!(matches!(
            recognizer.recognize(&frame(1)),
            Err(RecognitionError::Unavailable(1))
        ));
    }

    #[test]
    fn test_rejects_malformed_recording() {
        assert!(matches!(
            ReplayRecognizer::from_json_str(r#"{"0": [{"bbox": [1, 2]}]}"#),
            Err(RecognitionError::Parse(_))
        ));
    }
}
