use serde::Serialize;

use crate::frame::PixelRect;

/// One retained detector candidate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionBox {
    /// Display label (translated when a label table is loaded).
    pub label: String,
    pub class_id: usize,
    /// Objectness score, always above the detector threshold.
    pub confidence: f32,
    /// Frame-pixel coordinates.
    pub rect: PixelRect,
}

/// Product classification of one detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    /// Softmax probability scaled to 0..=100.
    pub confidence_percent: f32,
}
