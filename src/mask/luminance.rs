//! Brightness cutoff segmentation for light backgrounds

use super::MaskGenerator;
use crate::{
    error::Result,
    types::{Bitmap, OpacityMask, CHANNELS},
};
use tracing::instrument;

/// Rec. 601 luma, rounded to the nearest integer
#[inline]
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)).round() as u8
}

/// Clears bright pixels
///
/// The cutoff is `255 - tolerance`; a pixel with `luma >= cutoff` becomes
/// transparent. A higher tolerance lowers the cutoff, so the number of
/// cleared pixels never shrinks as the threshold grows.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuminanceGenerator;

impl LuminanceGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Luma at or above which a pixel counts as background
    #[must_use]
    pub fn cutoff(tolerance: u8) -> u8 {
        255 - tolerance
    }
}

impl MaskGenerator for LuminanceGenerator {
    fn name(&self) -> &'static str {
        "luminance"
    }

    #[instrument(level = "debug", skip(self, bitmap), fields(width = bitmap.width(), height = bitmap.height()))]
    fn generate(&self, bitmap: &Bitmap, tolerance: u8) -> Result<OpacityMask> {
        let cutoff = Self::cutoff(tolerance);

        let values = bitmap
            .pixels()
            .chunks_exact(CHANNELS)
            .map(|p| if luma(p[0], p[1], p[2]) >= cutoff { 0 } else { 255 })
            .collect();

        OpacityMask::new(bitmap.width(), bitmap.height(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Bitmap {
        let pixels = (0..=255u8).flat_map(|v| [v, v, v, 255]).collect();
        Bitmap::new(256, 1, pixels).unwrap()
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_bright_pixels_removed() {
        let mut bitmap = Bitmap::filled(2, 1, [250, 250, 250, 255]).unwrap();
        bitmap.set_pixel(1, 0, [30, 30, 30, 255]);
        // tolerance 26 -> cutoff 229
        let mask = LuminanceGenerator::new().generate(&bitmap, 26).unwrap();
        assert_eq!(mask.values(), &[0, 255]);
    }

    #[test]
    fn test_zero_tolerance_removes_only_white() {
        let mask = LuminanceGenerator::new().generate(&gradient(), 0).unwrap();
        assert_eq!(mask.statistics().transparent_pixels, 1);
        assert_eq!(mask.value(255, 0), Some(0));
    }

    #[test]
    fn test_monotonic_in_tolerance() {
        let bitmap = gradient();
        let generator = LuminanceGenerator::new();
        let mut previous = 0;
        for tolerance in (0..=255u8).step_by(5) {
            let cleared = generator
                .generate(&bitmap, tolerance)
                .unwrap()
                .statistics()
                .transparent_pixels;
            assert!(cleared >= previous);
            previous = cleared;
        }
        assert_eq!(previous, 256);
    }
}
