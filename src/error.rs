use thiserror::Error;

/// Failure categories surfaced by the inspection core.
///
/// Only `Config` and `ModelLoad` ever reach a caller during startup. Everything
/// raised while frames are flowing is logged and degraded at the stage that
/// produced it.
#[derive(Debug, Error)]
pub enum InspectError {
    /// Camera I/O. Logged, acquisition continues.
    #[error("capture error: {0}")]
    Capture(String),
    /// A model could not be loaded; the owning stage is disabled for the session.
    #[error("model load error ({path}): {reason}")]
    ModelLoad { path: String, reason: String },
    /// A single inference call failed; only that stage's output is degraded.
    #[error("inference error: {0}")]
    Inference(String),
    /// Frame buffer did not match its declared layout.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// Best-effort teardown failure. Logged only.
    #[error("cleanup error: {0}")]
    Cleanup(String),
}

impl InspectError {
    pub fn capture(reason: impl std::fmt::Display) -> Self {
        Self::Capture(reason.to_string())
    }

    pub fn inference(reason: impl std::fmt::Display) -> Self {
        Self::Inference(reason.to_string())
    }

    pub fn model_load(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
