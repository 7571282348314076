use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Buffer layouts a camera may hand over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum PixelFormat {
    #[serde(alias = "RGB8", alias = "rgb24")]
    Rgb24,
    #[serde(alias = "BGR8", alias = "bgr24")]
    Bgr24,
    #[serde(alias = "mono8")]
    Mono8,
    #[serde(alias = "NV12", alias = "nv12")]
    Nv12,
    #[serde(alias = "BayerRG8", alias = "bayer_rg8")]
    BayerRg8,
}

impl PixelFormat {
    /// Bytes per pixel of the primary plane.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Mono8 | PixelFormat::Nv12 | PixelFormat::BayerRg8 => 1,
        }
    }

    /// Name used by the camera parameter surface.
    pub fn camera_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB8",
            PixelFormat::Bgr24 => "BGR8",
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::BayerRg8 => "BayerRG8",
        }
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb8" | "rgb24" => Ok(PixelFormat::Rgb24),
            "bgr8" | "bgr24" => Ok(PixelFormat::Bgr24),
            "mono8" => Ok(PixelFormat::Mono8),
            "nv12" => Ok(PixelFormat::Nv12),
            "bayerrg8" | "bayer_rg8" => Ok(PixelFormat::BayerRg8),
            other => Err(anyhow!("unsupported pixel format '{}'", other)),
        }
    }
}

/// Decode a camera buffer into tightly packed RGB24.
///
/// `stride` is the byte length of one row of the primary plane and may include padding.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame has zero area ({}x{})", width, height));
    }
    let row_bytes = width
        .checked_mul(format.bytes_per_pixel())
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if stride < row_bytes {
        return Err(anyhow!(
            "stride {} shorter than row length {}",
            stride,
            row_bytes
        ));
    }
    let plane = (stride as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let expected = match format {
        PixelFormat::Nv12 => {
            // interleaved UV: ceil(h/2) rows of ceil(w/2) pairs
            let chroma_row = (width as usize).div_ceil(2) * 2;
            if (stride as usize) < chroma_row {
                return Err(anyhow!(
                    "NV12 stride {} shorter than chroma row {}",
                    stride,
                    chroma_row
                ));
            }
            (stride as usize)
                .checked_mul((height as usize).div_ceil(2))
                .and_then(|chroma| plane.checked_add(chroma))
                .ok_or_else(|| anyhow!("frame dimensions overflow"))?
        }
        _ => plane,
    };
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    let w = width as usize;
    let h = height as usize;
    let s = stride as usize;
    let mut rgb = vec![0u8; w * h * 3];

    match format {
        PixelFormat::Rgb24 => {
            for j in 0..h {
                rgb[j * w * 3..(j + 1) * w * 3].copy_from_slice(&pixels[j * s..j * s + w * 3]);
            }
        }
        PixelFormat::Bgr24 => {
            for j in 0..h {
                for i in 0..w {
                    let src = j * s + i * 3;
                    let dst = (j * w + i) * 3;
                    rgb[dst] = pixels[src + 2];
                    rgb[dst + 1] = pixels[src + 1];
                    rgb[dst + 2] = pixels[src];
                }
            }
        }
        PixelFormat::Mono8 => {
            for j in 0..h {
                for i in 0..w {
                    let v = pixels[j * s + i];
                    let dst = (j * w + i) * 3;
                    rgb[dst..dst + 3].copy_from_slice(&[v, v, v]);
                }
            }
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, w, h, s, &mut rgb),
        PixelFormat::BayerRg8 => bayer_rg8_to_rgb(pixels, w, h, s, &mut rgb),
    }

    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize, s: usize, rgb: &mut [u8]) {
    let y_plane = s * h;
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * s + i] as f32;
            let uv_index = y_plane + (j / 2) * s + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
}

// RGGB mosaic, nearest 2x2 cell. Odd trailing rows/columns reuse the last full sample.
fn bayer_rg8_to_rgb(pixels: &[u8], w: usize, h: usize, s: usize, rgb: &mut [u8]) {
    for j in 0..h {
        let y0 = j & !1;
        let y1 = (y0 + 1).min(h - 1);
        for i in 0..w {
            let x0 = i & !1;
            let x1 = (x0 + 1).min(w - 1);
            let r = pixels[y0 * s + x0];
            let g = ((pixels[y0 * s + x1] as u16 + pixels[y1 * s + x0] as u16) / 2) as u8;
            let b = pixels[y1 * s + x1];
            let offset = (j * w + i) * 3;
            rgb[offset] = r;
            rgb[offset + 1] = g;
            rgb[offset + 2] = b;
        }
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
