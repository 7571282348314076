//! V4L2 camera.
//!
//! Geometry and pixel format are negotiated when streaming starts, so `Width`, `Height`
//! and `PixelFormat` writes take effect on the next `start()`. Exposure and gain writes go
//! straight to the matching V4L2 controls; parameters with no V4L2 counterpart are kept
//! and reported at debug level.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::collections::HashMap;
use std::time::Duration;

use super::{CameraDevice, FrameFetch, ParameterValue};
use crate::config::CameraSettings;
use crate::error::InspectError;
use crate::frame::{Frame, PixelFormat};

/// Camera parameter name to V4L2 control name. Exposure is in 100us units on V4L2.
const CONTROL_NAMES: &[(&str, &str)] = &[
    ("ExposureTime", "Exposure Time, Absolute"),
    ("Gain", "Gain"),
    ("ExposureAuto", "Auto Exposure"),
    ("GainAuto", "Gain, Automatic"),
];

pub struct V4l2Camera {
    settings: CameraSettings,
    parameters: HashMap<String, ParameterValue>,
    state: Option<V4l2Stream>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
    active_stride: u32,
}

#[self_referencing]
struct V4l2Stream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            active_format: settings.pixel_format,
            active_stride: 0,
            settings,
            parameters: HashMap::new(),
            state: None,
        }
    }

    fn requested_dimension(&self, name: &str, fallback: u32) -> u32 {
        match self.parameters.get(name) {
            Some(ParameterValue::Int(v)) if *v > 0 => *v as u32,
            _ => fallback,
        }
    }

    fn requested_format(&self) -> PixelFormat {
        match self.parameters.get("PixelFormat") {
            Some(ParameterValue::Text(name)) => name.parse().unwrap_or(self.settings.pixel_format),
            _ => self.settings.pixel_format,
        }
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 device {}", self.settings.device))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.requested_dimension("Width", self.settings.width);
        format.height = self.requested_dimension("Height", self.settings.height);
        format.fourcc = v4l::FourCC::new(fourcc_for(self.requested_format()));
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.settings.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let fourcc = format.fourcc.repr;
        self.active_format = format_for(&fourcc).ok_or_else(|| {
            anyhow!(
                "device negotiated unsupported fourcc {}",
                String::from_utf8_lossy(&fourcc)
            )
        })?;
        self.active_width = format.width;
        self.active_height = format.height;
        self.active_stride = format.stride;

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Camera: failed to set fps on {}: {}",
                    self.settings.device,
                    err
                );
            }
        }

        let timeout = self.settings.frame_timeout;
        let state = V4l2StreamTryBuilder {
            device,
            stream_builder: |device| {
                let mut stream =
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))?;
                stream.set_timeout(timeout);
                Ok::<_, anyhow::Error>(stream)
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Camera: streaming {} ({}x{} {:?})",
            self.settings.device,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn write_control(&self, name: &str, value: i64) -> Result<bool> {
        let Some((_, control_name)) = CONTROL_NAMES.iter().find(|(n, _)| *n == name) else {
            return Ok(false);
        };
        if self.state.is_none() {
            // replayed by start()
            return Ok(false);
        }
        // the streaming handle is borrowed by its buffers; controls go through a second one
        let device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 control handle {}", self.settings.device))?;
        let controls = device.query_controls().context("query v4l2 controls")?;
        let Some(desc) = controls.iter().find(|c| c.name == *control_name) else {
            return Ok(false);
        };
        device
            .set_control(v4l::control::Control {
                id: desc.id,
                value: v4l::control::Value::Integer(value),
            })
            .with_context(|| format!("set v4l2 control '{}'", control_name))?;
        Ok(true)
    }

    fn store(&mut self, name: &str, value: ParameterValue) -> Result<(), InspectError> {
        let raw = match (&value, name) {
            (ParameterValue::Float(v), "ExposureTime") => Some((*v / 100.0).round() as i64),
            (ParameterValue::Float(v), _) => Some(v.round() as i64),
            (ParameterValue::Int(v), "ExposureTime") => Some(*v / 100),
            (ParameterValue::Int(v), _) => Some(*v),
            // V4L2 auto exposure menu: 1 manual, 3 aperture priority
            (ParameterValue::Text(mode), "ExposureAuto") => {
                Some(if mode == "Off" { 1 } else { 3 })
            }
            (ParameterValue::Text(mode), "GainAuto") => Some(i64::from(mode != "Off")),
            (ParameterValue::Text(_), _) => None,
        };
        if let Some(raw) = raw {
            match self.write_control(name, raw) {
                Ok(true) => {}
                Ok(false) => log::debug!("V4l2Camera: {} stored, no live control", name),
                Err(err) => return Err(InspectError::capture(format!("{:#}", err))),
            }
        }
        self.parameters.insert(name.to_string(), value);
        Ok(())
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn start(&mut self) -> Result<(), InspectError> {
        self.open()
            .map_err(|err| InspectError::capture(format!("{:#}", err)))?;
        let pending: Vec<(String, ParameterValue)> = self
            .parameters
            .iter()
            .filter(|(name, _)| CONTROL_NAMES.iter().any(|(n, _)| *n == name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in pending {
            if let Err(err) = self.store(&name, value) {
                log::warn!("V4l2Camera: {} not applied: {}", name, err);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InspectError> {
        if self.state.take().is_some() {
            log::info!("V4l2Camera: stopped {}", self.settings.device);
        }
        Ok(())
    }

    /// The wait is fixed to the configured frame timeout when streaming starts.
    fn get_frame(&mut self, _timeout: Duration) -> FrameFetch {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return FrameFetch::Error(InspectError::capture("v4l2 device not streaming"));
        };
        let (width, height, format, stride) = (
            self.active_width,
            self.active_height,
            self.active_format,
            self.active_stride,
        );
        state.with_mut(|fields| match fields.stream.next() {
            Ok((buf, _meta)) => {
                let mut frame = Frame::new(buf.to_vec(), width, height, format);
                if stride > 0 {
                    frame = frame.with_stride(stride);
                }
                FrameFetch::Frame(frame)
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => FrameFetch::Timeout,
            Err(err) => FrameFetch::Error(InspectError::capture(format!(
                "capture v4l2 frame: {}",
                err
            ))),
        })
    }

    fn set_enum(&mut self, name: &str, value: &str) -> Result<(), InspectError> {
        if name == "PixelFormat" {
            value
                .parse::<PixelFormat>()
                .map_err(|e| InspectError::capture(e.to_string()))?;
        }
        self.store(name, ParameterValue::Text(value.to_string()))
    }

    fn set_float(&mut self, name: &str, value: f64) -> Result<(), InspectError> {
        if !value.is_finite() {
            return Err(InspectError::capture(format!("{} must be finite", name)));
        }
        self.store(name, ParameterValue::Float(value))
    }

    fn set_int(&mut self, name: &str, value: i64) -> Result<(), InspectError> {
        self.store(name, ParameterValue::Int(value))
    }

    fn get_float(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name) {
            Some(ParameterValue::Float(v)) => Some(*v),
            Some(ParameterValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }
}

fn fourcc_for(format: PixelFormat) -> &'static [u8; 4] {
    match format {
        PixelFormat::Rgb24 => b"RGB3",
        PixelFormat::Bgr24 => b"BGR3",
        PixelFormat::Mono8 => b"GREY",
        PixelFormat::Nv12 => b"NV12",
        PixelFormat::BayerRg8 => b"RGGB",
    }
}

fn format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    match fourcc {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"GREY" => Some(PixelFormat::Mono8),
        b"NV12" => Some(PixelFormat::Nv12),
        b"RGGB" => Some(PixelFormat::BayerRg8),
        _ => None,
    }
}
