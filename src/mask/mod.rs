//! Opacity mask generators
//!
//! Each generator turns a bitmap plus a tolerance in `[0, 255]` into an
//! opacity mask of the same size: 0 marks background, 255 foreground.

pub mod color_key;
pub mod flood_fill;
pub mod luminance;

pub use color_key::{corner_median, ColorKeyGenerator};
pub use flood_fill::EdgeDetectGenerator;
pub use luminance::LuminanceGenerator;

use crate::{
    config::{BackgroundColor, SegmentationMethod},
    error::Result,
    services::ProcessingStage,
    types::{Bitmap, OpacityMask},
};

/// Strategy producing an opacity mask from a bitmap
pub trait MaskGenerator: Send + Sync {
    /// Identifier used in logs and metadata
    fn name(&self) -> &'static str;

    /// Build the mask for `bitmap` using a tolerance in `[0, 255]`
    fn generate(&self, bitmap: &Bitmap, tolerance: u8) -> Result<OpacityMask>;

    /// Same as [`generate`](Self::generate), announcing each internal phase
    fn generate_with_progress(
        &self,
        bitmap: &Bitmap,
        tolerance: u8,
        on_stage: &mut dyn FnMut(ProcessingStage),
    ) -> Result<OpacityMask> {
        on_stage(ProcessingStage::MaskGeneration);
        self.generate(bitmap, tolerance)
    }
}

/// Create the generator for a segmentation method
///
/// `background` only affects colour keying; `None` there means the
/// background is estimated from the four corners.
#[must_use]
pub fn create_generator(
    method: SegmentationMethod,
    background: Option<BackgroundColor>,
) -> Box<dyn MaskGenerator> {
    match method {
        SegmentationMethod::EdgeDetect => Box::new(EdgeDetectGenerator::new()),
        SegmentationMethod::ColorKey => Box::new(ColorKeyGenerator::new(background)),
        SegmentationMethod::Luminance => Box::new(LuminanceGenerator::new()),
    }
}

/// Manhattan RGB distance between two pixels, alpha ignored
#[inline]
pub(crate) fn rgb_distance(pixel: &[u8], reference: [u8; 3]) -> u32 {
    pixel
        .iter()
        .zip(reference.iter())
        .map(|(&a, &b)| u32::from(a.abs_diff(b)))
        .sum()
}
