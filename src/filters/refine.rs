//! Colour and alpha smoothing along the cutout rim

use crate::{
    config::RefineRadius,
    types::{Bitmap, CHANNELS},
};
use tracing::instrument;

use super::is_rim;

/// Smooth the opaque rim of a composited bitmap
///
/// Rim pixels are found from the original alpha channel. Each one is
/// replaced by the unweighted mean RGBA of the non-transparent pixels in its
/// `(2r+1)^2` window, read from the original. Transparent neighbours do not
/// count towards the mean.
#[must_use]
#[instrument(level = "debug", skip(bitmap), fields(width = bitmap.width(), height = bitmap.height(), radius = radius.get()))]
pub fn refine_edges(bitmap: &Bitmap, radius: RefineRadius) -> Bitmap {
    let r = radius.get() as usize;
    let (width, height) = (bitmap.width() as usize, bitmap.height() as usize);
    let source = bitmap.pixels();
    let mut output = bitmap.clone();

    if width <= 2 * r || height <= 2 * r {
        return output;
    }

    let alpha = |i: usize| source.get(i * CHANNELS + 3).copied().unwrap_or(0);
    let mut refined = 0usize;

    {
        let out = output.pixels_mut();
        for y in r..height - r {
            for x in r..width - r {
                let index = y * width + x;
                if !is_rim(alpha, index, width) {
                    continue;
                }

                let mut sums = [0u32; CHANNELS];
                let mut count = 0u32;
                for ny in y - r..=y + r {
                    let row = &source[(ny * width + x - r) * CHANNELS..(ny * width + x + r + 1) * CHANNELS];
                    for pixel in row.chunks_exact(CHANNELS).filter(|p| p[3] > 0) {
                        for (sum, &channel) in sums.iter_mut().zip(pixel) {
                            *sum += u32::from(channel);
                        }
                        count += 1;
                    }
                }

                // The pixel itself is opaque, so count >= 1
                let offset = index * CHANNELS;
                if let Some(slot) = out.get_mut(offset..offset + CHANNELS) {
                    for (value, sum) in slot.iter_mut().zip(sums) {
                        *value = (f64::from(sum) / f64::from(count)).round() as u8;
                    }
                    refined += 1;
                }
            }
        }
    }

    tracing::trace!(refined, "Refined rim pixels");
    output
}
