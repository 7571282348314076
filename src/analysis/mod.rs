//! Per-frame analysis.
//!
//! `AnalysisPipeline::analyze` runs the fixed stage order (decode, barcode, brightness,
//! colour, detection, classification, weight) and always returns a complete
//! `AnalysisResult`. A failing stage degrades only its own fields.

use serde::Serialize;

use crate::detect::{ClassificationResult, DetectionBox};

mod barcode;
mod pipeline;
mod sampling;
mod weight;

pub use barcode::{BarcodeDecoder, BarcodeOutcome, NoBarcodeDecoder};
#[cfg(feature = "barcode-rxing")]
pub use barcode::RxingDecoder;
pub use pipeline::{default_barcode_decoder, AnalysisPipeline, StageStatus};
pub use sampling::{classify_brightness, dominant_color, sample_stride};
pub use weight::estimate_weight;

/// Product label reported while no classification is available.
pub const PRODUCT_UNDETERMINED: &str = "type not determined";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Brightness {
    VeryDark,
    Dark,
    Normal,
    VeryBright,
}

impl std::fmt::Display for Brightness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Brightness::VeryDark => "very dark",
            Brightness::Dark => "dark",
            Brightness::Normal => "normal",
            Brightness::VeryBright => "very bright",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DominantColor {
    Red,
    Green,
    Blue,
    Balanced,
}

impl std::fmt::Display for DominantColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DominantColor::Red => "red",
            DominantColor::Green => "green",
            DominantColor::Blue => "blue",
            DominantColor::Balanced => "balanced",
        })
    }
}

/// Weight bucket inferred from a box's pixel height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum WeightClass {
    #[default]
    Unknown,
    Class50g,
    Class70g,
    Class100g,
    Class250g,
}

impl std::fmt::Display for WeightClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WeightClass::Unknown => "unknown",
            WeightClass::Class50g => "50g",
            WeightClass::Class70g => "70g",
            WeightClass::Class100g => "100g",
            WeightClass::Class250g => "250g",
        })
    }
}

/// Aggregate output of one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub barcode_text: Option<String>,
    pub brightness: Brightness,
    pub dominant_color: DominantColor,
    /// Labels of `detections`, same order.
    pub objects: Vec<String>,
    pub detections: Vec<DetectionBox>,
    /// One entry per detection when a classifier is loaded, `None` where that call failed.
    /// Empty otherwise.
    pub classifications: Vec<Option<ClassificationResult>>,
    pub product_label: String,
    pub product_confidence: f32,
    pub weight_class: WeightClass,
}

impl AnalysisResult {
    /// Result for a frame nothing could be computed from.
    pub fn degraded() -> Self {
        Self {
            barcode_text: None,
            brightness: Brightness::VeryDark,
            dominant_color: DominantColor::Balanced,
            objects: Vec::new(),
            detections: Vec::new(),
            classifications: Vec::new(),
            product_label: PRODUCT_UNDETERMINED.to_string(),
            product_confidence: 0.0,
            weight_class: WeightClass::Unknown,
        }
    }

    pub fn has_product(&self) -> bool {
        self.product_label != PRODUCT_UNDETERMINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_result_uses_sentinels() {
        let result = AnalysisResult::degraded();
        assert_eq!(result.product_label, PRODUCT_UNDETERMINED);
        assert_eq!(result.product_confidence, 0.0);
        assert_eq!(result.weight_class, WeightClass::Unknown);
        assert!(!result.has_product());
    }

    #[test]
    fn result_serializes_enums_by_name() {
        let json = serde_json::to_value(AnalysisResult::degraded()).unwrap();
        assert_eq!(json["brightness"], "VeryDark");
        assert_eq!(json["weight_class"], "Unknown");
        assert!(json["barcode_text"].is_null());
    }
}
