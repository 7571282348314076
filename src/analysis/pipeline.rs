use std::fmt;

use crate::config::InspectorConfig;
use crate::detect::{
    load_session, ClassificationResult, LabelTable, ObjectDetector, ProductClassifier, Vocabulary,
};
use crate::frame::{Frame, Raster};

use super::barcode::{BarcodeDecoder, NoBarcodeDecoder};
use super::sampling::{classify_brightness, dominant_color};
use super::weight::estimate_weight;
use super::{AnalysisResult, Brightness, DominantColor, WeightClass, PRODUCT_UNDETERMINED};

/// Load outcome of one model-backed stage, reported to the operator at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Ready { stage: &'static str, detail: String },
    Disabled { stage: &'static str, reason: String },
}

impl StageStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StageStatus::Ready { .. })
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ready { stage, detail } => write!(f, "{} ready: {}", stage, detail),
            StageStatus::Disabled { stage, reason } => write!(f, "{} disabled: {}", stage, reason),
        }
    }
}

/// Ordered stage composition.
///
/// Owns the inference sessions, so there is exactly one caller at a time: whoever holds
/// `&mut AnalysisPipeline`.
pub struct AnalysisPipeline {
    barcode: Box<dyn BarcodeDecoder>,
    detector: Option<ObjectDetector>,
    classifier: Option<ProductClassifier>,
    statuses: Vec<StageStatus>,
}

impl AnalysisPipeline {
    /// Pipeline with only the pixel stages and the given barcode decoder.
    pub fn new(barcode: Box<dyn BarcodeDecoder>) -> Self {
        Self {
            barcode,
            detector: None,
            classifier: None,
            statuses: Vec::new(),
        }
    }

    pub fn with_detector(mut self, detector: ObjectDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_classifier(mut self, classifier: ProductClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Build from configuration. Model load failures disable the affected stage and are
    /// recorded in `statuses()`; they never fail construction.
    pub fn from_config(cfg: &InspectorConfig) -> Self {
        let mut pipeline = Self::new(default_barcode_decoder());
        pipeline.statuses.push(StageStatus::Ready {
            stage: "barcode",
            detail: pipeline.barcode.name().to_string(),
        });

        let det = &cfg.detector;
        match det.model_path.as_deref() {
            None => pipeline.disable("detector", "no model configured".into()),
            Some(path) => {
                let size = det.input_size as usize;
                match load_session(path, [1, 3, size, size]) {
                    Ok(session) => {
                        let vocabulary = det.vocabulary_path.as_deref().and_then(|p| {
                            Vocabulary::load(p)
                                .map_err(|e| log::warn!("detector vocabulary ignored: {:#}", e))
                                .ok()
                        });
                        let labels = det
                            .labels_path
                            .as_deref()
                            .and_then(|p| {
                                LabelTable::load(p)
                                    .map_err(|e| log::warn!("label table ignored: {:#}", e))
                                    .ok()
                            })
                            .unwrap_or_default();
                        let detector = ObjectDetector::new(session, vocabulary)
                            .with_labels(labels)
                            .with_threshold(det.confidence_threshold);
                        pipeline.statuses.push(StageStatus::Ready {
                            stage: "detector",
                            detail: format!(
                                "{} ({} classes)",
                                path.display(),
                                detector.vocabulary().len()
                            ),
                        });
                        pipeline.detector = Some(detector);
                    }
                    Err(err) => pipeline.disable("detector", err.to_string()),
                }
            }
        }

        let clf = &cfg.classifier;
        match clf.model_path.as_deref() {
            None => pipeline.disable("classifier", "no model configured".into()),
            Some(path) => {
                let size = clf.input_size as usize;
                match load_session(path, [1, 3, size, size]) {
                    Ok(session) => {
                        let classifier = ProductClassifier::with_resolved_classes(
                            session,
                            clf.classes_path.as_deref(),
                            Some(path),
                        );
                        pipeline.statuses.push(StageStatus::Ready {
                            stage: "classifier",
                            detail: format!(
                                "{} ({} classes)",
                                path.display(),
                                classifier.classes().len()
                            ),
                        });
                        pipeline.classifier = Some(classifier);
                    }
                    Err(err) => pipeline.disable("classifier", err.to_string()),
                }
            }
        }

        pipeline
    }

    fn disable(&mut self, stage: &'static str, reason: String) {
        log::warn!("{} disabled: {}", stage, reason);
        self.statuses.push(StageStatus::Disabled { stage, reason });
    }

    pub fn statuses(&self) -> &[StageStatus] {
        &self.statuses
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Decode and analyse one frame, consuming it.
    pub fn analyze(&mut self, frame: Frame) -> AnalysisResult {
        match frame.decode() {
            Ok(raster) => self.analyze_raster(&raster),
            Err(err) => {
                log::debug!("analysis skipped: {}", err);
                AnalysisResult::degraded()
            }
        }
    }

    /// Run every stage over a decoded raster.
    pub fn analyze_raster(&mut self, raster: &Raster) -> AnalysisResult {
        if raster.is_empty() {
            return AnalysisResult::degraded();
        }

        let barcode_text = self.barcode.decode(raster).into_text();
        let brightness = classify_brightness(raster).unwrap_or(Brightness::VeryDark);
        let dominant_color = dominant_color(raster).unwrap_or(DominantColor::Balanced);

        let detections = match self.detector.as_mut() {
            Some(detector) => detector.detect(raster).unwrap_or_else(|err| {
                log::warn!("detection failed: {}", err);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut classifications: Vec<Option<ClassificationResult>> = Vec::new();
        let mut product: Option<ClassificationResult> = None;
        let mut weight_class = WeightClass::Unknown;
        for detection in &detections {
            if let Some(classifier) = self.classifier.as_mut() {
                match classifier.classify(raster, &detection.rect) {
                    Ok(result) => {
                        product = Some(result.clone());
                        classifications.push(Some(result));
                    }
                    Err(err) => {
                        log::debug!("classification of '{}' failed: {}", detection.label, err);
                        classifications.push(None);
                    }
                }
            }
            // last box wins
            weight_class = estimate_weight(detection.rect.h);
        }

        let (product_label, product_confidence) = match product {
            Some(result) => (result.label, result.confidence_percent),
            None => (PRODUCT_UNDETERMINED.to_string(), 0.0),
        };

        AnalysisResult {
            barcode_text,
            brightness,
            dominant_color,
            objects: detections.iter().map(|d| d.label.clone()).collect(),
            detections,
            classifications,
            product_label,
            product_confidence,
            weight_class,
        }
    }
}

/// Symbology backend compiled into this build.
pub fn default_barcode_decoder() -> Box<dyn BarcodeDecoder> {
    #[cfg(feature = "barcode-rxing")]
    {
        Box::new(super::barcode::RxingDecoder::default())
    }
    #[cfg(not(feature = "barcode-rxing"))]
    {
        Box::new(NoBarcodeDecoder)
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new(Box::new(NoBarcodeDecoder))
    }
}
