//! Camera collaborators.
//!
//! This module provides the sources of raw frames:
//! - Synthetic cameras (`stub://` devices) for tests and demos
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source implements `CameraDevice`. The acquisition loop owns the device while
//! streaming and is the only caller of `get_frame`. Parameters are typed: each value kind
//! has its own setter, so an unsupported kind cannot be expressed.

use serde::Deserialize;
use std::time::Duration;

use crate::config::CameraSettings;
use crate::error::InspectError;
use crate::frame::Frame;

pub(crate) mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// Largest region the line camera sensor supports.
pub const SENSOR_MAX_WIDTH: i64 = 2448;
pub const SENSOR_MAX_HEIGHT: i64 = 2048;

/// Outcome of one bounded frame wait.
#[derive(Debug)]
pub enum FrameFetch {
    Frame(Frame),
    /// Nothing arrived within the wait. Not an error.
    Timeout,
    /// Driver-reported I/O error. Transient; the caller keeps going.
    Error(InspectError),
}

/// Camera capture collaborator.
pub trait CameraDevice: Send {
    /// Identifier for logs and status text.
    fn name(&self) -> &str;

    /// Begin streaming.
    fn start(&mut self) -> Result<(), InspectError>;

    /// Stop streaming. Safe to call when not streaming.
    fn stop(&mut self) -> Result<(), InspectError>;

    /// Wait up to `timeout` for the next frame.
    fn get_frame(&mut self, timeout: Duration) -> FrameFetch;

    fn set_enum(&mut self, name: &str, value: &str) -> Result<(), InspectError>;

    fn set_float(&mut self, name: &str, value: f64) -> Result<(), InspectError>;

    fn set_int(&mut self, name: &str, value: i64) -> Result<(), InspectError>;

    /// Read back a numeric parameter, if the device reports it.
    fn get_float(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// A typed camera parameter value.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Route the value to the setter for its kind.
    pub fn apply(&self, name: &str, device: &mut dyn CameraDevice) -> Result<(), InspectError> {
        match self {
            ParameterValue::Int(v) => device.set_int(name, *v),
            ParameterValue::Float(v) => device.set_float(name, *v),
            ParameterValue::Text(v) => device.set_enum(name, v),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => f.write_str(v),
        }
    }
}

/// Sensor region of interest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub offset_x: i64,
    #[serde(default)]
    pub offset_y: i64,
}

impl Roi {
    /// The whole sensor.
    pub fn full() -> Self {
        Self {
            width: SENSOR_MAX_WIDTH,
            height: SENSOR_MAX_HEIGHT,
            offset_x: 0,
            offset_y: 0,
        }
    }

    /// Parameter writes that realise this region, in the order the sensor accepts them.
    pub fn parameters(&self) -> [(&'static str, ParameterValue); 4] {
        [
            ("Width", ParameterValue::Int(self.width)),
            ("Height", ParameterValue::Int(self.height)),
            ("OffsetX", ParameterValue::Int(self.offset_x)),
            ("OffsetY", ParameterValue::Int(self.offset_y)),
        ]
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.offset_x, self.offset_y
        )
    }
}

/// Open the camera named by `settings.device`.
///
/// `stub://` devices are synthetic. Anything else needs the ingest-v4l2 feature.
pub fn open_camera(settings: &CameraSettings) -> anyhow::Result<Box<dyn CameraDevice>> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(settings.clone())));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow::anyhow!(
            "camera device '{}' requires the ingest-v4l2 feature",
            settings.device
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_values_deserialize_by_kind() {
        let values: Vec<ParameterValue> =
            serde_json::from_str(r#"[1920, 10.5, "Continuous"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParameterValue::Int(1920),
                ParameterValue::Float(10.5),
                ParameterValue::Text("Continuous".into()),
            ]
        );
    }

    #[test]
    fn full_roi_covers_sensor() {
        let roi = Roi::full();
        assert_eq!(roi.to_string(), "2448x2048+0+0");
        assert_eq!(roi.parameters()[0], ("Width", ParameterValue::Int(2448)));
    }
}
