//! Frame ownership and decoded rasters.
//!
//! - `Frame`: one camera buffer plus its layout. Owned by the capture context until it is
//!   sent to the presentation context, then consumed by decoding.
//! - `Raster`: decoded RGB8 pixels ready for pixel-level processing.
//! - `PixelRect`: axis-aligned rectangle in frame-pixel coordinates.

use image::{imageops, RgbImage};
use std::time::{Duration, Instant, SystemTime};

use crate::error::InspectError;
use crate::ingest::normalize::normalize_to_rgb;
pub use crate::ingest::normalize::PixelFormat;

// ----------------------------------------------------------------------------
// Frame: raw camera buffer
// ----------------------------------------------------------------------------

/// Raw camera frame. Not `Clone`: ownership moves from capture to decode exactly once.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    /// Bytes per row of the primary plane.
    pub stride: u32,
    pub format: PixelFormat,

    /// Wall-clock capture time.
    pub captured_at: SystemTime,
    capture_instant: Instant,
}

impl Frame {
    /// Create a frame with a tightly packed stride.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: width.saturating_mul(format.bytes_per_pixel()),
            format,
            captured_at: SystemTime::now(),
            capture_instant: Instant::now(),
        }
    }

    /// Override the row stride for padded buffers.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Time since capture, used to report hand-off latency.
    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    /// Decode into an RGB raster, consuming the frame.
    pub fn decode(self) -> Result<Raster, InspectError> {
        let rgb = normalize_to_rgb(&self.data, self.width, self.height, self.stride, self.format)
            .map_err(|e| InspectError::InvalidFrame(e.to_string()))?;
        Raster::from_rgb(self.width, self.height, rgb)
    }
}

impl std::fmt::Debug for Frame {
    // Pixel bytes are deliberately left out.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// PixelRect
// ----------------------------------------------------------------------------

/// Rectangle in frame-pixel coordinates. Top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Intersect with a `width`x`height` image. `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0) as i64;
        let y0 = self.y.max(0) as i64;
        let x1 = (self.x as i64 + self.w as i64).min(width as i64);
        let y1 = (self.y as i64 + self.h as i64).min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

// ----------------------------------------------------------------------------
// Raster: decoded pixels
// ----------------------------------------------------------------------------

/// Decoded RGB8 image.
#[derive(Clone)]
pub struct Raster {
    image: RgbImage,
}

impl Raster {
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, InspectError> {
        let image = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            InspectError::InvalidFrame(format!("RGB buffer does not fit {}x{}", width, height))
        })?;
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// A 0x0 raster, used where a frame could not be decoded.
    pub fn empty() -> Self {
        Self {
            image: RgbImage::new(0, 0),
        }
    }

    /// Solid single-colour raster.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    /// Packed RGB bytes, row major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Integer luma plane (mean of the three channels).
    pub fn luma(&self) -> Vec<u8> {
        self.image
            .pixels()
            .map(|p| ((p.0[0] as u16 + p.0[1] as u16 + p.0[2] as u16) / 3) as u8)
            .collect()
    }

    /// Copy out the part of `rect` that lies inside the raster.
    pub fn crop(&self, rect: &PixelRect) -> Option<Raster> {
        let (x, y, w, h) = rect.clamp_to(self.width(), self.height())?;
        Some(Raster {
            image: imageops::crop_imm(&self.image, x, y, w, h).to_image(),
        })
    }

    /// Bilinear resize to an exact size.
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        if self.width() == width && self.height() == height {
            return self.clone();
        }
        Raster {
            image: imageops::resize(&self.image, width, height, imageops::FilterType::Triangle),
        }
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Raster({}x{})", self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mono_frame() {
        let frame = Frame::new(vec![7u8; 6], 3, 2, PixelFormat::Mono8);
        let raster = frame.decode().unwrap();
        assert_eq!(raster.width(), 3);
        assert_eq!(raster.height(), 2);
        assert_eq!(raster.pixel(2, 1), [7, 7, 7]);
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let frame = Frame::new(vec![0u8; 5], 4, 4, PixelFormat::Rgb24);
        assert!(matches!(frame.decode(), Err(InspectError::InvalidFrame(_))));
    }

    #[test]
    fn zero_length_frame_is_invalid() {
        let frame = Frame::new(Vec::new(), 0, 0, PixelFormat::Rgb24);
        assert!(frame.decode().is_err());
    }

    #[test]
    fn rect_clamps_to_image() {
        let rect = PixelRect::new(-5, 2, 20, 100);
        assert_eq!(rect.clamp_to(10, 10), Some((0, 2, 10, 8)));
        assert_eq!(PixelRect::new(12, 0, 4, 4).clamp_to(10, 10), None);
        assert_eq!(PixelRect::new(0, 0, 0, 4).clamp_to(10, 10), None);
    }

    #[test]
    fn crop_and_resize() {
        let raster = Raster::filled(8, 6, [10, 20, 30]);
        let crop = raster.crop(&PixelRect::new(2, 2, 4, 3)).unwrap();
        assert_eq!((crop.width(), crop.height()), (4, 3));
        let resized = crop.resized(16, 16);
        assert_eq!((resized.width(), resized.height()), (16, 16));
        assert_eq!(resized.pixel(8, 8), [10, 20, 30]);
    }

    #[test]
    fn debug_output_hides_pixels() {
        let frame = Frame::new(vec![1, 2, 3], 1, 1, PixelFormat::Rgb24);
        let text = format!("{:?}", frame);
        assert!(text.contains("bytes: 3"));
    }
}
