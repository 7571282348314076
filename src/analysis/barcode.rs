//! Barcode decoder collaborator.
//!
//! A decoder works on an 8-bit luma plane. `BarcodeDecoder::decode` drives the retry
//! order: as captured, inverted, then rotated by 90 degrees. Absence is
//! `BarcodeOutcome::NotFound`, never an error.

use crate::frame::Raster;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BarcodeOutcome {
    Found(String),
    NotFound,
}

impl BarcodeOutcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            BarcodeOutcome::Found(text) => Some(text),
            BarcodeOutcome::NotFound => None,
        }
    }
}

pub trait BarcodeDecoder: Send {
    fn name(&self) -> &'static str;

    /// Single attempt on a row-major luma plane.
    fn decode_luma(&mut self, luma: &[u8], width: u32, height: u32) -> BarcodeOutcome;

    /// Decode with inversion and rotation retries.
    fn decode(&mut self, raster: &Raster) -> BarcodeOutcome {
        if raster.is_empty() {
            return BarcodeOutcome::NotFound;
        }
        let (w, h) = (raster.width(), raster.height());
        let mut luma = raster.luma();

        if let found @ BarcodeOutcome::Found(_) = self.decode_luma(&luma, w, h) {
            return found;
        }
        invert(&mut luma);
        if let found @ BarcodeOutcome::Found(_) = self.decode_luma(&luma, w, h) {
            return found;
        }
        invert(&mut luma);
        let rotated = rotate_90(&luma, w, h);
        self.decode_luma(&rotated, h, w)
    }
}

/// Decoder used when no symbology backend is compiled in.
#[derive(Debug, Default)]
pub struct NoBarcodeDecoder;

impl BarcodeDecoder for NoBarcodeDecoder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn decode_luma(&mut self, _luma: &[u8], _width: u32, _height: u32) -> BarcodeOutcome {
        BarcodeOutcome::NotFound
    }
}

fn invert(luma: &mut [u8]) {
    for v in luma.iter_mut() {
        *v = 255 - *v;
    }
}

/// Rotate clockwise. The result is `height` wide and `width` tall.
fn rotate_90(luma: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            out[x * h + (h - 1 - y)] = luma[y * w + x];
        }
    }
    out
}

#[cfg(feature = "barcode-rxing")]
pub use rxing_decoder::RxingDecoder;

#[cfg(feature = "barcode-rxing")]
mod rxing_decoder {
    use super::{BarcodeDecoder, BarcodeOutcome};
    use rxing::BarcodeFormat;

    /// `rxing` decoder restricted to the symbologies printed on the line.
    pub struct RxingDecoder {
        formats: Vec<BarcodeFormat>,
    }

    impl Default for RxingDecoder {
        fn default() -> Self {
            Self {
                formats: vec![
                    BarcodeFormat::CODE_128,
                    BarcodeFormat::QR_CODE,
                    BarcodeFormat::EAN_13,
                ],
            }
        }
    }

    impl BarcodeDecoder for RxingDecoder {
        fn name(&self) -> &'static str {
            "rxing"
        }

        fn decode_luma(&mut self, luma: &[u8], width: u32, height: u32) -> BarcodeOutcome {
            match rxing::helpers::detect_in_luma(luma.to_vec(), width, height, None) {
                Ok(result) if self.formats.contains(result.getBarcodeFormat()) => {
                    BarcodeOutcome::Found(result.getText().to_string())
                }
                Ok(result) => {
                    log::debug!("ignoring {:?} barcode", result.getBarcodeFormat());
                    BarcodeOutcome::NotFound
                }
                Err(_) => BarcodeOutcome::NotFound,
            }
        }
    }
}
