use crate::error::InspectError;
use crate::frame::Raster;

/// Dense NCHW `f32` input for one inference call.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl InputTensor {
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Resize `raster` to `width`x`height` and write it as a 1x3xHxW tensor in R,G,B
    /// plane order, mapping every channel byte through `normalize`.
    pub fn from_raster(
        raster: &Raster,
        width: u32,
        height: u32,
        normalize: impl Fn(u8) -> f32,
    ) -> Self {
        let resized = raster.resized(width, height);
        let w = width as usize;
        let h = height as usize;
        let plane = w * h;
        let mut tensor = Self::zeros([1, 3, h, w]);
        for (idx, px) in resized.as_bytes().chunks_exact(3).enumerate() {
            tensor.data[idx] = normalize(px[0]);
            tensor.data[plane + idx] = normalize(px[1]);
            tensor.data[2 * plane + idx] = normalize(px[2]);
        }
        tensor
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at batch 0.
    pub fn at(&self, channel: usize, y: usize, x: usize) -> f32 {
        let [_, _, h, w] = self.shape;
        self.data[channel * h * w + y * w + x]
    }
}

/// Inference collaborator.
///
/// One session wraps one loaded model with a fixed input shape. Sessions are not shared:
/// the pipeline owns them and calls `run` from a single context, one call at a time.
pub trait InferenceSession: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Fixed NCHW input shape the model was loaded with.
    fn input_shape(&self) -> [usize; 4];

    /// Output shape when the model declares a concrete one.
    fn output_shape(&self) -> Option<Vec<usize>> {
        None
    }

    /// Run one inference and return the first output flattened.
    fn run(&mut self, input: InputTensor) -> Result<Vec<f32>, InspectError>;
}
