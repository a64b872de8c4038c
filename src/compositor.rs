//! Writes an opacity mask into a bitmap's alpha channel

use crate::{
    error::Result,
    types::{Bitmap, OpacityMask, CHANNELS},
};

/// Return a copy of `bitmap` whose alpha channel is the mask
///
/// RGB is left exactly as it was; nothing is premultiplied.
///
/// # Errors
/// - `DimensionMismatch` when the mask was built for a different size
pub fn apply_mask(bitmap: &Bitmap, mask: &OpacityMask) -> Result<Bitmap> {
    apply_mask_owned(bitmap.clone(), mask)
}

/// Same as [`apply_mask`], reusing the bitmap's buffer
pub fn apply_mask_owned(mut bitmap: Bitmap, mask: &OpacityMask) -> Result<Bitmap> {
    mask.ensure_matches(&bitmap)?;

    for (pixel, &alpha) in bitmap
        .pixels_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(mask.values())
    {
        if let Some(slot) = pixel.get_mut(3) {
            *slot = alpha;
        }
    }

    Ok(bitmap)
}
