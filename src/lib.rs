//! Line Inspector
//!
//! Product inspection for a production line: a camera supplies frames continuously and a
//! throttled subset of them runs through a fixed analysis pipeline whose results drive the
//! operator display.
//!
//! # Data flow
//!
//! ```text
//! camera -> acquisition loop -> (bounded hand-off) -> scheduler -> display sink
//!                                                        |
//!                                                        +-> pipeline -> result sink
//! ```
//!
//! - The acquisition loop runs on its own thread and owns the camera while streaming.
//! - Everything right of the hand-off runs on the presentation context: whichever thread
//!   drives `InspectionController::pump`.
//! - The pipeline never fails as a whole. Each stage degrades its own fields.
//!
//! # Module Structure
//!
//! - `frame`: Frame ownership, pixel formats, decoded rasters
//! - `ingest`: Camera collaborator trait, typed parameters, synthetic and V4L2 cameras
//! - `acquisition`: Capture thread state machine and frame hand-off
//! - `scheduler`: Analysis throttle
//! - `detect`: Inference sessions, detection and classification stages
//! - `analysis`: Pixel stages, weight estimation, pipeline and result aggregation
//! - `presentation`: Presentation sink and operator summary text
//! - `controller`: Top-level owner wiring it all together

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod controller;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod presentation;
pub mod scheduler;
pub mod ui;

pub use acquisition::{AcquisitionLoop, AcquisitionState, FrameCounter, StopOutcome};
pub use analysis::{
    AnalysisPipeline, AnalysisResult, BarcodeDecoder, BarcodeOutcome, Brightness, DominantColor,
    StageStatus, WeightClass, PRODUCT_UNDETERMINED,
};
pub use config::InspectorConfig;
pub use controller::InspectionController;
pub use detect::{ClassificationResult, DetectionBox, ObjectDetector, ProductClassifier};
pub use error::InspectError;
pub use frame::{Frame, PixelFormat, PixelRect, Raster};
pub use ingest::{open_camera, CameraDevice, FrameFetch, ParameterValue, Roi, SyntheticCamera};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Camera;
pub use presentation::{summary_text, LogSink, PresentationSink};
pub use scheduler::AnalysisScheduler;
