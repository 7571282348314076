#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceSession, InputTensor};
use crate::error::InspectError;

/// Tract-based ONNX session.
///
/// Loads a local model file once and runs it on fixed-shape NCHW inputs.
pub struct TractSession {
    model: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
    output_shape: Option<Vec<usize>>,
}

impl TractSession {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, input_shape: [usize; 4]) -> Result<Self, InspectError> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(InspectError::model_load(
                model_path.display(),
                "file not found",
            ));
        }
        Self::build(model_path, input_shape)
            .map_err(|e| InspectError::model_load(model_path.display(), format!("{:#}", e)))
    }

    fn build(model_path: &Path, input_shape: [usize; 4]) -> Result<Self> {
        let [n, c, h, w] = input_shape;
        let optimized = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(n, c, h, w)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?;
        let output_shape = optimized
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.to_vec()));
        let model = optimized
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractSession: loaded {} (input {:?}, output {:?})",
            model_path.display(),
            input_shape,
            output_shape
        );

        Ok(Self {
            model,
            input_shape,
            output_shape,
        })
    }

    fn infer(&self, input: InputTensor) -> Result<Vec<f32>> {
        let [n, c, h, w] = input.shape();
        let array = tract_ndarray::Array4::from_shape_vec((n, c, h, w), input.into_data())
            .map_err(|e| anyhow!("input tensor shape mismatch: {}", e))?;
        let outputs = self
            .model
            .run(tvec!(array.into_tensor().into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(values.iter().copied().collect())
    }
}

impl InferenceSession for TractSession {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn output_shape(&self) -> Option<Vec<usize>> {
        self.output_shape.clone()
    }

    fn run(&mut self, input: InputTensor) -> Result<Vec<f32>, InspectError> {
        if input.shape() != self.input_shape {
            return Err(InspectError::inference(format!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }
        self.infer(input)
            .map_err(|e| InspectError::inference(format!("{:#}", e)))
    }
}
