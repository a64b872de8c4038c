//! Gaussian feathering of the mask boundary

use crate::{config::FeatherRadius, types::OpacityMask};
use tracing::instrument;

use super::is_rim;

/// Unnormalized Gaussian weights over a `(2r+1)^2` window, row-major
fn gaussian_window(radius: usize) -> Vec<f64> {
    let r = radius as i64;
    let two_r_sq = 2.0 * (r * r) as f64;
    (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (-((dx * dx + dy * dy) as f64) / two_r_sq).exp()))
        .collect()
}

/// Soften the mask where opaque pixels meet fully transparent ones
///
/// Each rim pixel becomes the Gaussian-weighted mean of the original mask
/// over its `(2r+1)^2` neighbourhood, transparent neighbours included.
/// Every other pixel is copied unchanged.
#[must_use]
#[instrument(level = "debug", skip(mask), fields(width = mask.width(), height = mask.height(), radius = radius.get()))]
pub fn feather_mask(mask: &OpacityMask, radius: FeatherRadius) -> OpacityMask {
    let r = radius.get() as usize;
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let source = mask.values();
    let mut output = mask.clone();

    if width <= 2 * r || height <= 2 * r {
        return output;
    }

    let window = gaussian_window(r);
    let weight_sum: f64 = window.iter().sum();
    let side = 2 * r + 1;
    let at = |i: usize| source.get(i).copied().unwrap_or(0);
    let mut feathered = 0usize;

    {
        let out = output.values_mut();
        for y in r..height - r {
            for x in r..width - r {
                let index = y * width + x;
                if !is_rim(at, index, width) {
                    continue;
                }

                let mut acc = 0.0;
                for (wy, row) in window.chunks_exact(side).enumerate() {
                    let row_start = (y + wy - r) * width + x - r;
                    for (weight, &value) in row.iter().zip(source.iter().skip(row_start)) {
                        acc += weight * f64::from(value);
                    }
                }

                if let Some(slot) = out.get_mut(index) {
                    *slot = (acc / weight_sum).round() as u8;
                    feathered += 1;
                }
            }
        }
    }

    tracing::trace!(feathered, "Feathered rim pixels");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc(size: u32, radius: f64) -> OpacityMask {
        let centre = f64::from(size - 1) / 2.0;
        let values = (0..size * size)
            .map(|i| {
                let (x, y) = (f64::from(i % size), f64::from(i / size));
                if ((x - centre).powi(2) + (y - centre).powi(2)).sqrt() <= radius {
                    255
                } else {
                    0
                }
            })
            .collect();
        OpacityMask::new(size, size, values).unwrap()
    }

    #[test]
    fn test_window_weights() {
        let window = gaussian_window(1);
        assert_eq!(window.len(), 9);
        assert!((window[4] - 1.0).abs() < 1e-12);
        assert!((window[1] - (-0.5f64).exp()).abs() < 1e-12);
        assert!((window[0] - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_only_rim_pixels_change() {
        let original = disc(31, 9.0);
        let feathered = feather_mask(&original, FeatherRadius::new(3));
        let width = 31usize;

        for y in 1..30usize {
            for x in 1..30usize {
                let index = y * width + x;
                let rim = is_rim(|i: usize| original.values()[i], index, width);
                if !rim {
                    assert_eq!(feathered.values()[index], original.values()[index]);
                }
            }
        }
        assert!(feathered.statistics().partial_pixels > 0);
    }

    #[test]
    fn test_disc_boundary_ramps_down() {
        let original = disc(41, 12.0);
        let feathered = feather_mask(&original, FeatherRadius::new(4));

        // Walk outward from the centre along the middle row
        let row: Vec<u8> = (20..41).map(|x| feathered.value(x, 20).unwrap()).collect();
        assert!(row.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(row[0], 255);
        assert_eq!(*row.last().unwrap(), 0);
        assert!(row.iter().any(|&v| v > 0 && v < 255));
    }

    #[test]
    fn test_border_band_untouched() {
        // Opaque left half touching the image border
        let values = (0..10 * 10).map(|i| if i % 10 < 5 { 255 } else { 0 }).collect();
        let mask = OpacityMask::new(10, 10, values).unwrap();
        let feathered = feather_mask(&mask, FeatherRadius::new(2));

        for x in 0..10 {
            assert_eq!(feathered.value(x, 0), mask.value(x, 0));
            assert_eq!(feathered.value(x, 9), mask.value(x, 9));
        }
        assert!(feathered.value(4, 5).unwrap() < 255);
    }

    #[test]
    fn test_small_mask_unchanged() {
        let mask = OpacityMask::new(3, 3, vec![0, 0, 0, 0, 255, 0, 0, 0, 0]).unwrap();
        assert_eq!(feather_mask(&mask, FeatherRadius::new(2)), mask);
    }
}
