pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::ScriptedSession;

#[cfg(feature = "backend-tract")]
pub use tract::TractSession;

use std::path::Path;

use crate::detect::backend::InferenceSession;
use crate::error::InspectError;

/// Load a model file with the compiled-in inference backend.
pub fn load_session(
    model_path: &Path,
    input_shape: [usize; 4],
) -> Result<Box<dyn InferenceSession>, InspectError> {
    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(TractSession::load(model_path, input_shape)?))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = input_shape;
        Err(InspectError::model_load(
            model_path.display(),
            "no inference backend compiled in (enable the backend-tract feature)",
        ))
    }
}
