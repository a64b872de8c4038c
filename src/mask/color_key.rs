//! Colour keying against a single background colour

use super::{rgb_distance, MaskGenerator};
use crate::{
    config::BackgroundColor,
    error::Result,
    types::{Bitmap, OpacityMask, CHANNELS},
};
use tracing::instrument;

/// Per-channel median of the four corner pixels
///
/// The median of four values is the mean of the middle two, truncated.
#[must_use]
pub fn corner_median(bitmap: &Bitmap) -> BackgroundColor {
    let (w, h) = bitmap.dimensions();
    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)]
        .map(|(x, y)| bitmap.pixel(x, y).unwrap_or([255, 255, 255, 255]));

    let median = |channel: usize| {
        let mut values = corners.map(|p| p[channel]);
        values.sort_unstable();
        ((u16::from(values[1]) + u16::from(values[2])) / 2) as u8
    };

    BackgroundColor::new(median(0), median(1), median(2))
}

/// Clears every pixel within `tolerance * 3` of the background colour
#[derive(Debug, Clone, Default)]
pub struct ColorKeyGenerator {
    background: Option<BackgroundColor>,
}

impl ColorKeyGenerator {
    /// `None` estimates the background from the corners of each bitmap
    #[must_use]
    pub fn new(background: Option<BackgroundColor>) -> Self {
        Self { background }
    }

    /// Background colour that will be keyed out of `bitmap`
    #[must_use]
    pub fn resolve_background(&self, bitmap: &Bitmap) -> BackgroundColor {
        self.background.unwrap_or_else(|| corner_median(bitmap))
    }
}

impl MaskGenerator for ColorKeyGenerator {
    fn name(&self) -> &'static str {
        "color-key"
    }

    #[instrument(level = "debug", skip(self, bitmap), fields(width = bitmap.width(), height = bitmap.height()))]
    fn generate(&self, bitmap: &Bitmap, tolerance: u8) -> Result<OpacityMask> {
        let background = self.resolve_background(bitmap);
        let limit = u32::from(tolerance) * 3;
        tracing::debug!(background = %background.to_hex(), limit, "Colour keying");

        let values = bitmap
            .pixels()
            .chunks_exact(CHANNELS)
            .map(|pixel| {
                if rgb_distance(pixel, background.rgb()) <= limit {
                    0
                } else {
                    255
                }
            })
            .collect();

        OpacityMask::new(bitmap.width(), bitmap.height(), values)
    }
}
