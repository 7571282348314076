//! Grid-sampled brightness and colour.
//!
//! Both measures read every `stride`-th pixel in each direction, with
//! `stride = max(width, height) / 50` (at least 1). Large frames therefore cost about the
//! same as small ones.

use super::{Brightness, DominantColor};
use crate::frame::Raster;

const GRID_DIVISOR: u32 = 50;

pub fn sample_stride(width: u32, height: u32) -> u32 {
    (width.max(height) / GRID_DIVISOR).max(1)
}

fn grid(raster: &Raster) -> impl Iterator<Item = [u8; 3]> + '_ {
    let stride = sample_stride(raster.width(), raster.height()) as usize;
    (0..raster.height())
        .step_by(stride)
        .flat_map(move |y| (0..raster.width()).step_by(stride).map(move |x| (x, y)))
        .map(|(x, y)| raster.pixel(x, y))
}

/// Bucket the mean sampled luma. `None` for an empty raster.
pub fn classify_brightness(raster: &Raster) -> Option<Brightness> {
    if raster.is_empty() {
        return None;
    }
    let (sum, count) = grid(raster).fold((0u64, 0u64), |(sum, count), [r, g, b]| {
        (sum + (r as u64 + g as u64 + b as u64) / 3, count + 1)
    });
    let mean = sum / count.max(1);
    Some(match mean {
        m if m < 50 => Brightness::VeryDark,
        m if m < 120 => Brightness::Dark,
        m if m < 200 => Brightness::Normal,
        _ => Brightness::VeryBright,
    })
}

/// Channel with the strictly largest sampled sum. Ties are `Balanced`.
pub fn dominant_color(raster: &Raster) -> Option<DominantColor> {
    if raster.is_empty() {
        return None;
    }
    let [r, g, b] = grid(raster).fold([0u64; 3], |acc, px| {
        [
            acc[0] + px[0] as u64,
            acc[1] + px[1] as u64,
            acc[2] + px[2] as u64,
        ]
    });
    Some(if r > g && r > b {
        DominantColor::Red
    } else if g > r && g > b {
        DominantColor::Green
    } else if b > r && b > g {
        DominantColor::Blue
    } else {
        DominantColor::Balanced
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_scales_with_longest_side() {
        assert_eq!(sample_stride(1920, 1480), 38);
        assert_eq!(sample_stride(30, 20), 1);
        assert_eq!(sample_stride(0, 0), 1);
    }

    #[test]
    fn brightness_buckets() {
        assert_eq!(
            classify_brightness(&Raster::filled(100, 100, [0, 0, 0])),
            Some(Brightness::VeryDark)
        );
        assert_eq!(
            classify_brightness(&Raster::filled(100, 100, [255, 255, 255])),
            Some(Brightness::VeryBright)
        );
        assert_eq!(
            classify_brightness(&Raster::filled(10, 10, [50, 50, 50])),
            Some(Brightness::Dark)
        );
        assert_eq!(
            classify_brightness(&Raster::filled(10, 10, [199, 199, 199])),
            Some(Brightness::Normal)
        );
        assert_eq!(classify_brightness(&Raster::empty()), None);
    }

    #[test]
    fn colour_dominance() {
        assert_eq!(
            dominant_color(&Raster::filled(64, 64, [255, 0, 0])),
            Some(DominantColor::Red)
        );
        assert_eq!(
            dominant_color(&Raster::filled(64, 64, [10, 90, 20])),
            Some(DominantColor::Green)
        );
        assert_eq!(
            dominant_color(&Raster::filled(64, 64, [120, 120, 120])),
            Some(DominantColor::Balanced)
        );
        // two-way tie at the top
        assert_eq!(
            dominant_color(&Raster::filled(64, 64, [200, 10, 200])),
            Some(DominantColor::Balanced)
        );
    }
}
