//! Category vocabularies and display-label tables.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// The 80 COCO categories, in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Ordered category names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    names: Vec<String>,
}

impl Vocabulary {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// `class_0 .. class_{count-1}`.
    pub fn placeholders(count: usize) -> Self {
        Self::new((0..count).map(|i| format!("class_{}", i)).collect())
    }

    /// Read a JSON array of names, or a text file with one name per line.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary {}", path.display()))?;
        let is_text = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        let names = if is_text {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| anyhow!("invalid vocabulary {}: {}", path.display(), e))?
        };
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `index`, or its placeholder when out of range.
    pub fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }
}

/// Raw category name to display label.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    entries: HashMap<String, String>,
}

impl LabelTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Read a JSON object `{ "raw": "display", ... }`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label table {}", path.display()))?;
        let entries = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid label table {}: {}", path.display(), e))?;
        Ok(Self { entries })
    }

    /// Display label, falling back to the raw name.
    pub fn display(&self, raw: &str) -> String {
        self.entries
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Class names for a product classifier.
///
/// Order: explicit file, then `classes.json` beside the model, then placeholders sized
/// from the model's last positive output dimension, then two placeholders. An unreadable
/// or malformed classes file yields an empty list, so every label becomes a placeholder.
pub fn resolve_classifier_classes(
    classes_path: Option<&Path>,
    model_path: Option<&Path>,
    output_shape: Option<&[usize]>,
) -> Vec<String> {
    let sibling = model_path
        .and_then(Path::parent)
        .map(|dir| dir.join("classes.json"))
        .filter(|candidate| candidate.is_file());
    let chosen = classes_path
        .filter(|path| path.is_file())
        .map(Path::to_path_buf)
        .or(sibling);

    if let Some(path) = chosen {
        return match Vocabulary::load(&path) {
            Ok(vocab) => vocab.names,
            Err(err) => {
                log::warn!("classifier classes ignored: {:#}", err);
                Vec::new()
            }
        };
    }

    let count = output_shape
        .and_then(|dims| dims.iter().rev().copied().find(|d| *d > 0))
        .unwrap_or(2);
    Vocabulary::placeholders(count).names
}
