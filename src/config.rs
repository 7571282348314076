use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::PixelFormat;
use crate::ingest::{ParameterValue, Roi};

const DEFAULT_CAMERA_DEVICE: &str = "stub://line";
const DEFAULT_CAMERA_WIDTH: u32 = 1920;
const DEFAULT_CAMERA_HEIGHT: u32 = 1480;
const DEFAULT_CAMERA_FPS: u32 = 25;
const DEFAULT_FRAME_TIMEOUT_MS: u64 = 1000;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 2000;
const DEFAULT_QUEUE_DEPTH: usize = 2;
const DEFAULT_ANALYSIS_INTERVAL_MS: u64 = 500;
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_DETECTOR_THRESHOLD: f32 = 0.4;
const DEFAULT_CLASSIFIER_INPUT: u32 = 224;

#[derive(Debug, Deserialize, Default)]
struct InspectorConfigFile {
    camera: Option<CameraConfigFile>,
    acquisition: Option<AcquisitionConfigFile>,
    analysis: Option<AnalysisConfigFile>,
    detector: Option<DetectorConfigFile>,
    classifier: Option<ClassifierConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    frame_timeout_ms: Option<u64>,
    pixel_format: Option<PixelFormat>,
    parameters: Option<Vec<ParameterSetting>>,
    roi: Option<Roi>,
}

#[derive(Debug, Deserialize, Default)]
struct AcquisitionConfigFile {
    join_timeout_ms: Option<u64>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisConfigFile {
    interval_ms: Option<u64>,
    analyze_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    vocabulary_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    model_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    input_size: Option<u32>,
}

/// One camera parameter write applied at connect time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterSetting {
    pub name: String,
    pub value: ParameterValue,
}

impl ParameterSetting {
    pub fn new(name: &str, value: ParameterValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InspectorConfig {
    pub camera: CameraSettings,
    pub acquisition: AcquisitionSettings,
    pub analysis: AnalysisSettings,
    pub detector: DetectorSettings,
    pub classifier: ClassifierSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Bounded wait for each frame.
    pub frame_timeout: Duration,
    pub pixel_format: PixelFormat,
    pub parameters: Vec<ParameterSetting>,
    pub roi: Option<Roi>,
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    /// How long `stop()` waits for the capture thread before abandoning it.
    pub join_timeout: Duration,
    /// Frames buffered between capture and presentation. Oldest are dropped.
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Minimum spacing between pipeline runs.
    pub interval: Duration,
    pub analyze_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub vocabulary_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model_path: Option<PathBuf>,
    pub classes_path: Option<PathBuf>,
    pub input_size: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: DEFAULT_CAMERA_FPS,
            frame_timeout: Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS),
            pixel_format: PixelFormat::BayerRg8,
            parameters: default_parameters(),
            roi: None,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_ANALYSIS_INTERVAL_MS),
            analyze_enabled: true,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: DEFAULT_DETECTOR_INPUT,
            confidence_threshold: DEFAULT_DETECTOR_THRESHOLD,
            vocabulary_path: None,
            labels_path: None,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            classes_path: None,
            input_size: DEFAULT_CLASSIFIER_INPUT,
        }
    }
}

fn default_parameters() -> Vec<ParameterSetting> {
    vec![
        ParameterSetting::new("AcquisitionMode", ParameterValue::Text("Continuous".into())),
        ParameterSetting::new("TriggerMode", ParameterValue::Text("Off".into())),
        ParameterSetting::new("ExposureTime", ParameterValue::Float(50000.0)),
        ParameterSetting::new("Gain", ParameterValue::Float(10.0)),
        ParameterSetting::new("PixelFormat", ParameterValue::Text("BayerRG8".into())),
    ]
}

impl InspectorConfig {
    /// Load from `INSPECTOR_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INSPECTOR_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path, then apply env overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectorConfigFile) -> Self {
        let defaults = InspectorConfig::default();

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            target_fps: camera_file.target_fps.unwrap_or(defaults.camera.target_fps),
            frame_timeout: camera_file
                .frame_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.camera.frame_timeout),
            pixel_format: camera_file
                .pixel_format
                .unwrap_or(defaults.camera.pixel_format),
            parameters: camera_file
                .parameters
                .unwrap_or(defaults.camera.parameters),
            roi: camera_file.roi,
        };

        let acquisition_file = file.acquisition.unwrap_or_default();
        let acquisition = AcquisitionSettings {
            join_timeout: acquisition_file
                .join_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.acquisition.join_timeout),
            queue_depth: acquisition_file
                .queue_depth
                .unwrap_or(defaults.acquisition.queue_depth),
        };

        let analysis_file = file.analysis.unwrap_or_default();
        let analysis = AnalysisSettings {
            interval: analysis_file
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.analysis.interval),
            analyze_enabled: analysis_file
                .analyze_enabled
                .unwrap_or(defaults.analysis.analyze_enabled),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector_file.model_path,
            input_size: detector_file
                .input_size
                .unwrap_or(defaults.detector.input_size),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(defaults.detector.confidence_threshold),
            vocabulary_path: detector_file.vocabulary_path,
            labels_path: detector_file.labels_path,
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            model_path: classifier_file.model_path,
            classes_path: classifier_file.classes_path,
            input_size: classifier_file
                .input_size
                .unwrap_or(defaults.classifier.input_size),
        };

        Self {
            camera,
            acquisition,
            analysis,
            detector,
            classifier,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("INSPECTOR_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(path) = std::env::var("INSPECTOR_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("INSPECTOR_CLASSIFIER_MODEL") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("INSPECTOR_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.detector.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("INSPECTOR_ANALYSIS_INTERVAL_MS") {
            let ms: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("INSPECTOR_ANALYSIS_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.analysis.interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.analysis.interval.is_zero() {
            return Err(anyhow!("analysis interval must be greater than zero"));
        }
        if self.acquisition.queue_depth == 0 {
            return Err(anyhow!("acquisition queue depth must be at least 1"));
        }
        if self.acquisition.join_timeout <= self.camera.frame_timeout {
            return Err(anyhow!(
                "acquisition join timeout ({}ms) must exceed the frame timeout ({}ms)",
                self.acquisition.join_timeout.as_millis(),
                self.camera.frame_timeout.as_millis()
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }
        let threshold = self.detector.confidence_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(anyhow!(
                "detector confidence threshold must be within (0, 1), got {}",
                threshold
            ));
        }
        if self.detector.input_size == 0 || self.classifier.input_size == 0 {
            return Err(anyhow!("model input sizes must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<InspectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
