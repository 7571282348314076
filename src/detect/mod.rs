//! Model-backed stages.
//!
//! `InferenceSession` is the seam to the inference engine. `ObjectDetector` and
//! `ProductClassifier` are thin adapters over it that own the tensor layout and output
//! decoding for their model.

mod backend;
pub mod backends;
mod classifier;
mod detector;
mod result;
mod vocabulary;

pub use backend::{InferenceSession, InputTensor};
pub use backends::{load_session, ScriptedSession};
pub use classifier::{softmax, ProductClassifier};
pub use detector::{ObjectDetector, DEFAULT_CONFIDENCE_THRESHOLD};
pub use result::{ClassificationResult, DetectionBox};
pub use vocabulary::{resolve_classifier_classes, LabelTable, Vocabulary, COCO_CLASSES};
