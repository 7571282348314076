//! Detection stage.
//!
//! Input: the raster resized to a square `input_size` (640 by default), R,G,B planes,
//! values scaled to [0,1].
//!
//! Output: fixed-size candidate records `[cx, cy, w, h, objectness, class scores...]` in
//! input-pixel units. A candidate is kept when its objectness is above the threshold; its
//! category is the arg-max of the class scores. Overlapping candidates are all kept (no
//! non-maximum suppression).

use crate::detect::backend::{InferenceSession, InputTensor};
use crate::detect::result::DetectionBox;
use crate::detect::vocabulary::{LabelTable, Vocabulary};
use crate::error::InspectError;
use crate::frame::{PixelRect, Raster};

/// Objectness threshold. Candidates at or below it are discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// Box geometry plus objectness precede the class scores.
const RECORD_PREFIX: usize = 5;

pub struct ObjectDetector {
    session: Box<dyn InferenceSession>,
    vocabulary: Vocabulary,
    labels: LabelTable,
    confidence_threshold: f32,
    record_len: usize,
}

impl ObjectDetector {
    /// Wrap a loaded session.
    ///
    /// Without an explicit vocabulary the record length comes from the model's output
    /// shape: 85-wide records get the COCO names, anything else numbered placeholders.
    pub fn new(session: Box<dyn InferenceSession>, vocabulary: Option<Vocabulary>) -> Self {
        let declared = session
            .output_shape()
            .and_then(|dims| dims.last().copied())
            .filter(|len| *len > RECORD_PREFIX);
        let (vocabulary, record_len) = match (vocabulary, declared) {
            (Some(vocab), Some(len)) => (vocab, len),
            (Some(vocab), None) => {
                let len = RECORD_PREFIX + vocab.len();
                (vocab, len)
            }
            (None, Some(len)) if len == RECORD_PREFIX + 80 => (Vocabulary::coco(), len),
            (None, Some(len)) => (Vocabulary::placeholders(len - RECORD_PREFIX), len),
            (None, None) => (Vocabulary::coco(), RECORD_PREFIX + 80),
        };
        Self {
            session,
            vocabulary,
            labels: LabelTable::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            record_len,
        }
    }

    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn record_len(&self) -> usize {
        self.record_len
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Run the detector on one raster.
    pub fn detect(&mut self, raster: &Raster) -> Result<Vec<DetectionBox>, InspectError> {
        if raster.is_empty() {
            return Err(InspectError::InvalidFrame("empty raster".into()));
        }
        let [_, _, h, w] = self.session.input_shape();
        let input = InputTensor::from_raster(raster, w as u32, h as u32, |v| v as f32 / 255.0);
        let output = self.session.run(input)?;
        Ok(self.decode(&output, raster.width(), raster.height()))
    }

    /// Decode raw output into boxes in frame-pixel coordinates.
    pub fn decode(&self, output: &[f32], frame_width: u32, frame_height: u32) -> Vec<DetectionBox> {
        let [_, _, in_h, in_w] = self.session.input_shape();
        let sx = frame_width as f32 / in_w.max(1) as f32;
        let sy = frame_height as f32 / in_h.max(1) as f32;

        let records = output.chunks_exact(self.record_len);
        if !records.remainder().is_empty() {
            log::debug!(
                "detector output has {} trailing values (record length {})",
                records.remainder().len(),
                self.record_len
            );
        }

        let mut boxes = Vec::new();
        for record in records {
            let objectness = record[4];
            // NaN fails this comparison too
            if !(objectness > self.confidence_threshold) {
                continue;
            }
            let Some(class_id) = arg_max(&record[RECORD_PREFIX..]) else {
                continue;
            };
            let raw = self.vocabulary.name(class_id);
            let (cx, cy, bw, bh) = (record[0], record[1], record[2], record[3]);
            let rect = PixelRect::new(
                ((cx - bw / 2.0) * sx).round() as i32,
                ((cy - bh / 2.0) * sy).round() as i32,
                (bw * sx).round() as i32,
                (bh * sy).round() as i32,
            );
            boxes.push(DetectionBox {
                label: self.labels.display(&raw),
                class_id,
                confidence: objectness,
                rect,
            });
        }
        boxes
    }
}

/// Index of the first maximum. `None` for an empty slice.
pub(crate) fn arg_max(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, value) in values.iter().copied().enumerate() {
        match best {
            Some((_, current)) if !(value > current) => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedSession;
    use std::collections::HashMap;

    fn record(cx: f32, cy: f32, w: f32, h: f32, obj: f32, class: usize, classes: usize) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, obj];
        let mut scores = vec![0.0; classes];
        scores[class] = 0.9;
        r.extend(scores);
        r
    }

    fn detector(output: Vec<f32>, vocab: Vec<&str>) -> ObjectDetector {
        let session = ScriptedSession::new([1, 3, 640, 640]).with_output(output);
        ObjectDetector::new(
            Box::new(session),
            Some(Vocabulary::new(vocab.into_iter().map(String::from).collect())),
        )
    }

    #[test]
    fn threshold_filters_candidates() {
        let mut output = record(320.0, 320.0, 100.0, 200.0, 0.9, 1, 2);
        output.extend(record(100.0, 100.0, 10.0, 10.0, 0.4, 0, 2));
        output.extend(record(100.0, 100.0, 10.0, 10.0, 0.39, 0, 2));
        let mut det = detector(output, vec!["pack", "jar"]);

        let boxes = det.detect(&Raster::filled(640, 640, [0, 0, 0])).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "jar");
        assert_eq!(boxes[0].rect, PixelRect::new(270, 220, 100, 200));
        assert!(boxes.iter().all(|b| b.confidence >= 0.4));
    }

    #[test]
    fn boxes_scale_to_frame_pixels() {
        let det = detector(Vec::new(), vec!["pack"]);
        let output = record(320.0, 320.0, 64.0, 64.0, 0.8, 0, 1);
        let boxes = det.decode(&output, 1920, 1280);
        assert_eq!(boxes[0].rect, PixelRect::new(864, 576, 192, 128));
    }

    #[test]
    fn overlapping_boxes_are_all_kept() {
        let mut output = record(320.0, 320.0, 100.0, 100.0, 0.9, 0, 1);
        output.extend(record(322.0, 321.0, 100.0, 100.0, 0.85, 0, 1));
        let det = detector(Vec::new(), vec!["pack"]);
        assert_eq!(det.decode(&output, 640, 640).len(), 2);
    }

    #[test]
    fn labels_are_translated() {
        let det = detector(Vec::new(), vec!["cup"]).with_labels(LabelTable::new(HashMap::from([(
            "cup".to_string(),
            "чашка".to_string(),
        )])));
        let boxes = det.decode(&record(10.0, 10.0, 4.0, 4.0, 0.7, 0, 1), 640, 640);
        assert_eq!(boxes[0].label, "чашка");
    }

    #[test]
    fn vocabulary_falls_back_to_output_shape() {
        let session = ScriptedSession::new([1, 3, 640, 640]).with_output_shape(vec![1, 25200, 8]);
        let det = ObjectDetector::new(Box::new(session), None);
        assert_eq!(det.record_len(), 8);
        assert_eq!(det.vocabulary().name(2), "class_2");

        let session = ScriptedSession::new([1, 3, 640, 640]).with_output_shape(vec![1, 25200, 85]);
        let det = ObjectDetector::new(Box::new(session), None);
        assert_eq!(det.vocabulary().name(0), "person");
    }

    #[test]
    fn nan_objectness_is_dropped() {
        let det = detector(Vec::new(), vec!["pack"]);
        let boxes = det.decode(&record(10.0, 10.0, 4.0, 4.0, f32::NAN, 0, 1), 640, 640);
        assert!(boxes.is_empty());
    }

    #[test]
    fn arg_max_prefers_first_maximum() {
        assert_eq!(arg_max(&[0.1, 0.5, 0.5]), Some(1));
        assert_eq!(arg_max(&[]), None);
    }
}
