//! Rectangular crops

use crate::{
    config::AspectRatio,
    error::Result,
    types::{Bitmap, CropRegion},
};
use image::imageops;

/// Copy `region` out of `bitmap`
///
/// # Errors
/// - `InvalidCrop` if the region is empty or reaches past the source
pub fn crop(bitmap: &Bitmap, region: CropRegion) -> Result<Bitmap> {
    region.validate_within(bitmap.width(), bitmap.height())?;

    let source = bitmap.to_rgba_image();
    let cropped = imageops::crop_imm(&source, region.x, region.y, region.width, region.height)
        .to_image();
    tracing::trace!(%region, "Cropped bitmap");
    Bitmap::from_rgba_image(cropped)
}

/// Largest rectangle of `ratio` centred in a `width x height` source
///
/// Wider sources keep their full height, narrower ones their full width.
/// The result is always at least 1x1 and never larger than the source.
#[must_use]
pub fn centered_aspect_region(width: u32, height: u32, ratio: AspectRatio) -> CropRegion {
    let target = ratio.ratio();
    let source = f64::from(width) / f64::from(height.max(1));

    let (crop_width, crop_height) = if source > target {
        ((f64::from(height) * target).round() as u32, height)
    } else {
        (width, (f64::from(width) / target).round() as u32)
    };
    let crop_width = crop_width.clamp(1, width.max(1));
    let crop_height = crop_height.clamp(1, height.max(1));

    CropRegion::new(
        (width - crop_width) / 2,
        (height - crop_height) / 2,
        crop_width,
        crop_height,
    )
}

/// Centred crop to one of the supported aspect ratios
pub fn crop_to_aspect(bitmap: &Bitmap, ratio: AspectRatio) -> Result<Bitmap> {
    let region = centered_aspect_region(bitmap.width(), bitmap.height(), ratio);
    tracing::debug!(%ratio, %region, "Aspect-ratio crop");
    crop(bitmap, region)
}
