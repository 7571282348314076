//! Product classification stage.
//!
//! Each detection box is cropped from the frame, resized to the classifier input
//! (224x224), normalized per channel with `(v/255 - 0.5) / 0.5` and run through the
//! classifier. Scores go through a softmax; the arg-max class and its probability as a
//! percentage form the result.

use std::path::Path;

use crate::detect::backend::{InferenceSession, InputTensor};
use crate::detect::detector::arg_max;
use crate::detect::result::ClassificationResult;
use crate::detect::vocabulary::resolve_classifier_classes;
use crate::error::InspectError;
use crate::frame::{PixelRect, Raster};

pub struct ProductClassifier {
    session: Box<dyn InferenceSession>,
    classes: Vec<String>,
}

impl ProductClassifier {
    /// Wrap a session with an explicit class list.
    pub fn new(session: Box<dyn InferenceSession>, classes: Vec<String>) -> Self {
        Self { session, classes }
    }

    /// Wrap a session, resolving class names from disk.
    pub fn with_resolved_classes(
        session: Box<dyn InferenceSession>,
        classes_path: Option<&Path>,
        model_path: Option<&Path>,
    ) -> Self {
        let shape = session.output_shape();
        let classes = resolve_classifier_classes(classes_path, model_path, shape.as_deref());
        log::info!("classifier: {} class names", classes.len());
        Self { session, classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Classify the region `rect` of `raster`.
    pub fn classify(
        &mut self,
        raster: &Raster,
        rect: &PixelRect,
    ) -> Result<ClassificationResult, InspectError> {
        let crop = raster.crop(rect).ok_or_else(|| {
            InspectError::InvalidFrame(format!("box {:?} lies outside the frame", rect))
        })?;
        let [_, _, h, w] = self.session.input_shape();
        let input = InputTensor::from_raster(&crop, w as u32, h as u32, |v| {
            (v as f32 / 255.0 - 0.5) / 0.5
        });
        let scores = self.session.run(input)?;
        let probabilities = softmax(&scores);
        let best = arg_max(&probabilities)
            .ok_or_else(|| InspectError::inference("classifier returned no scores"))?;

        let label = self
            .classes
            .get(best)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", best));
        Ok(ClassificationResult {
            label,
            confidence_percent: probabilities[best] * 100.0,
        })
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}
