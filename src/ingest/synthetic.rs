//! Synthetic camera for `stub://` devices.
//!
//! Produces a grey conveyor background with a coloured product block whose height sweeps
//! across the weight-class range. Frames are paced to `target_fps`.
//!
//! Device strings may carry flags after `?`:
//! - `fail-start`: `start()` reports a capture error
//! - `flaky`: every fifth fetch reports an I/O error
//! - `slow`: never delivers frames, every fetch times out

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{CameraDevice, FrameFetch, ParameterValue};
use crate::config::CameraSettings;
use crate::error::InspectError;
use crate::frame::{Frame, PixelFormat};

pub struct SyntheticCamera {
    settings: CameraSettings,
    parameters: HashMap<String, ParameterValue>,
    streaming: bool,
    frame_count: u64,
    fetch_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            parameters: HashMap::new(),
            streaming: false,
            frame_count: 0,
            fetch_count: 0,
            next_due: None,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.settings
            .device
            .split_once('?')
            .map(|(_, flags)| flags.split(['&', ',']).any(|f| f == flag))
            .unwrap_or(false)
    }

    fn dimension(&self, name: &str, fallback: u32) -> u32 {
        match self.parameters.get(name) {
            Some(ParameterValue::Int(v)) if *v > 0 => *v as u32,
            _ => fallback,
        }
    }

    fn pixel_format(&self) -> PixelFormat {
        match self.parameters.get("PixelFormat") {
            Some(ParameterValue::Text(name)) => name.parse().unwrap_or(self.settings.pixel_format),
            _ => self.settings.pixel_format,
        }
    }

    fn frame_interval(&self) -> Duration {
        let fps = self.settings.target_fps.max(1);
        Duration::from_micros(1_000_000 / fps as u64)
    }

    fn generate_frame(&mut self) -> Frame {
        self.frame_count += 1;
        let width = self.dimension("Width", self.settings.width);
        let height = self.dimension("Height", self.settings.height);
        let format = self.pixel_format();
        let rgb = synthetic_scene(width, height, self.frame_count);
        Frame::new(encode(&rgb, width, height, format), width, height, format)
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn start(&mut self) -> Result<(), InspectError> {
        if self.has_flag("fail-start") {
            return Err(InspectError::capture(format!(
                "{}: stream start rejected",
                self.settings.device
            )));
        }
        self.streaming = true;
        self.next_due = Some(Instant::now());
        log::info!("SyntheticCamera: streaming from {}", self.settings.device);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InspectError> {
        if self.streaming {
            log::info!(
                "SyntheticCamera: stopped {} after {} frames",
                self.settings.device,
                self.frame_count
            );
        }
        self.streaming = false;
        self.next_due = None;
        Ok(())
    }

    fn get_frame(&mut self, timeout: Duration) -> FrameFetch {
        if !self.streaming {
            return FrameFetch::Error(InspectError::capture("camera is not streaming"));
        }
        self.fetch_count += 1;
        if self.has_flag("slow") {
            std::thread::sleep(timeout);
            return FrameFetch::Timeout;
        }
        if self.has_flag("flaky") && self.fetch_count % 5 == 0 {
            return FrameFetch::Error(InspectError::capture("synthetic buffer underrun"));
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        let wait = due.saturating_duration_since(now);
        if wait > timeout {
            std::thread::sleep(timeout);
            return FrameFetch::Timeout;
        }
        std::thread::sleep(wait);
        self.next_due = Some(due.max(now) + self.frame_interval());
        FrameFetch::Frame(self.generate_frame())
    }

    fn set_enum(&mut self, name: &str, value: &str) -> Result<(), InspectError> {
        if name == "PixelFormat" {
            value
                .parse::<PixelFormat>()
                .map_err(|e| InspectError::capture(e.to_string()))?;
        }
        self.parameters
            .insert(name.to_string(), ParameterValue::Text(value.to_string()));
        Ok(())
    }

    fn set_float(&mut self, name: &str, value: f64) -> Result<(), InspectError> {
        if !value.is_finite() {
            return Err(InspectError::capture(format!("{} must be finite", name)));
        }
        self.parameters
            .insert(name.to_string(), ParameterValue::Float(value));
        Ok(())
    }

    fn set_int(&mut self, name: &str, value: i64) -> Result<(), InspectError> {
        if matches!(name, "Width" | "Height") && value <= 0 {
            return Err(InspectError::capture(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        self.parameters
            .insert(name.to_string(), ParameterValue::Int(value));
        Ok(())
    }

    fn get_float(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name) {
            Some(ParameterValue::Float(v)) => Some(*v),
            Some(ParameterValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }
}

/// RGB scene: grey belt, one product block in the middle.
fn synthetic_scene(width: u32, height: u32, frame_count: u64) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut rgb = vec![0u8; w * h * 3];
    for px in rgb.chunks_exact_mut(3) {
        px.copy_from_slice(&[96, 96, 96]);
    }

    let block_h = ((frame_count * 37) % (h as u64).max(1)) as usize / 2 + h / 8;
    let block_w = w / 4;
    let x0 = (w - block_w) / 2;
    let y0 = h.saturating_sub(block_h) / 2;
    let colour = [180u8, 40, 40];
    for y in y0..(y0 + block_h).min(h) {
        for x in x0..x0 + block_w {
            let offset = (y * w + x) * 3;
            rgb[offset..offset + 3].copy_from_slice(&colour);
        }
    }
    rgb
}

/// Re-encode packed RGB into the camera's output format.
fn encode(rgb: &[u8], width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    match format {
        PixelFormat::Rgb24 => rgb.to_vec(),
        PixelFormat::Bgr24 => rgb
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect(),
        PixelFormat::Mono8 => rgb
            .chunks_exact(3)
            .map(|p| ((p[0] as u16 + p[1] as u16 + p[2] as u16) / 3) as u8)
            .collect(),
        PixelFormat::BayerRg8 => {
            let mut mosaic = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    let channel = match (y % 2, x % 2) {
                        (0, 0) => 0,
                        (1, 1) => 2,
                        _ => 1,
                    };
                    mosaic[y * w + x] = rgb[(y * w + x) * 3 + channel];
                }
            }
            mosaic
        }
        PixelFormat::Nv12 => {
            // luma only; neutral chroma
            let mut out: Vec<u8> = rgb
                .chunks_exact(3)
                .map(|p| ((p[0] as u16 + p[1] as u16 + p[2] as u16) / 3) as u8)
                .collect();
            out.resize(w * h + w * h / 2, 128);
            out
        }
    }
}
