//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::services::ImageCodec;
use chrono::{DateTime, Utc};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Bytes per RGBA pixel
pub const CHANNELS: usize = 4;

fn checked_pixel_count(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(BgRemovalError::invalid_dimensions(format!(
            "{}x{} has no pixels",
            width, height
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| {
            BgRemovalError::invalid_dimensions(format!("{}x{} overflows the address space", width, height))
        })
}

/// Owned RGBA buffer, row-major with a top-left origin.
///
/// The pixel buffer always holds exactly `width * height * 4` bytes and
/// both dimensions are non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Wrap an RGBA buffer, checking it against the given dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let count = checked_pixel_count(width, height)?;
        if pixels.len() != count * CHANNELS {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "{}x{} RGBA needs {} bytes, buffer has {}",
                width,
                height,
                count * CHANNELS,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a bitmap where every pixel has the same RGBA value
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let count = checked_pixel_count(width, height)?;
        let pixels = rgba.repeat(count);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw RGBA bytes
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw RGBA bytes; the length cannot change through this slice
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consume the bitmap and return its RGBA bytes
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA value at (x, y), or `None` outside the bitmap
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.pixels
            .get(offset..offset + CHANNELS)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Overwrite the RGBA value at (x, y); returns false outside the bitmap
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        match self.pixels.get_mut(offset..offset + CHANNELS) {
            Some(slot) => {
                slot.copy_from_slice(&rgba);
                true
            },
            None => false,
        }
    }

    /// Copy into an `image` crate buffer
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        self.clone().into_rgba_image()
    }

    /// Convert into an `image` crate buffer without copying
    #[must_use]
    pub fn into_rgba_image(self) -> RgbaImage {
        // Length is guaranteed by construction
        RgbaImage::from_raw(self.width, self.height, self.pixels)
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    /// Wrap an `image` crate buffer
    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

impl TryFrom<RgbaImage> for Bitmap {
    type Error = BgRemovalError;

    fn try_from(image: RgbaImage) -> Result<Self> {
        Self::from_rgba_image(image)
    }
}

/// Per-pixel opacity, 0 = fully transparent, 255 = fully opaque
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpacityMask {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl OpacityMask {
    /// Wrap opacity values, checking them against the given dimensions
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> Result<Self> {
        let count = checked_pixel_count(width, height)?;
        if values.len() != count {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "{}x{} mask needs {} values, got {}",
                width,
                height,
                count,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Mask with every pixel set to `value`
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self> {
        let count = checked_pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            values: vec![value; count],
        })
    }

    /// Fully opaque mask matching a bitmap
    #[must_use]
    pub fn opaque_like(bitmap: &Bitmap) -> Self {
        Self {
            width: bitmap.width(),
            height: bitmap.height(),
            values: vec![255; bitmap.pixel_count()],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [u8] {
        &mut self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<u8> {
        self.values
    }

    /// Opacity at (x, y), or `None` outside the mask
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Fail with `DimensionMismatch` unless the mask covers exactly this bitmap
    pub fn ensure_matches(&self, bitmap: &Bitmap) -> Result<()> {
        if self.dimensions() == bitmap.dimensions() {
            Ok(())
        } else {
            Err(BgRemovalError::dimension_mismatch(
                bitmap.dimensions(),
                self.dimensions(),
            ))
        }
    }

    /// Convert the mask to a grayscale image
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.values.clone())
            .unwrap_or_else(|| GrayImage::new(0, 0))
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.values.len();
        let transparent_pixels = self.values.iter().filter(|&&v| v == 0).count();
        let opaque_pixels = self.values.iter().filter(|&&v| v == 255).count();

        MaskStatistics {
            total_pixels,
            transparent_pixels,
            opaque_pixels,
            partial_pixels: total_pixels - transparent_pixels - opaque_pixels,
            transparent_ratio: transparent_pixels as f32 / total_pixels.max(1) as f32,
        }
    }

    /// Save mask as a grayscale PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(BgRemovalError::Encode)
    }
}

/// Statistics about an opacity mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub transparent_pixels: usize,
    pub opaque_pixels: usize,
    pub partial_pixels: usize,
    pub transparent_ratio: f32,
}

/// Rectangle in source-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region is non-empty and lies entirely inside a `width x height` source
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }

    /// Fail with `InvalidCrop` unless the region fits the source
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if self.fits_within(width, height) {
            Ok(())
        } else {
            Err(BgRemovalError::invalid_crop(format!(
                "region {} does not fit inside {}x{}",
                self, width, height
            )))
        }
    }

    /// Scale every coordinate by `factor`, rounding to the nearest pixel
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: u32| (f64::from(v) * factor).round().max(0.0) as u32;
        Self {
            x: scale(self.x),
            y: scale(self.y),
            width: scale(self.width),
            height: scale(self.height),
        }
    }

    /// Shrink and shift the region until it fits a `width x height` source.
    ///
    /// Size is clamped to `[1, source]`, then the origin to `[0, source - size]`.
    #[must_use]
    pub fn clamped_to(&self, width: u32, height: u32) -> Self {
        let clamped_width = self.width.clamp(1, width.max(1));
        let clamped_height = self.height.clamp(1, height.max(1));
        Self {
            x: self.x.min(width.saturating_sub(clamped_width)),
            y: self.y.min(height.saturating_sub(clamped_height)),
            width: clamped_width,
            height: clamped_height,
        }
    }
}

impl std::fmt::Display for CropRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for CropRegion {
    type Err = BgRemovalError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BgRemovalError::invalid_crop(format!("'{}': {}", s, e)))?;

        match parts.as_slice() {
            [x, y, width, height] => Ok(Self::new(*x, *y, *width, *height)),
            _ => Err(BgRemovalError::invalid_crop(format!(
                "'{}': expected x,y,width,height",
                s
            ))),
        }
    }
}

/// Timing breakdown for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Mask generation
    pub mask_ms: u64,

    /// Feathering (0 when disabled)
    pub feather_ms: u64,

    /// Writing the mask into the alpha channel
    pub composite_ms: u64,

    /// Edge refinement (0 when disabled)
    pub refine_ms: u64,

    /// PNG encoding, if the result was encoded
    pub encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Time not attributed to any measured phase
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.mask_ms
            + self.feather_ms
            + self.composite_ms
            + self.refine_ms
            + self.encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(measured)
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Segmentation method used
    pub method: String,

    /// User-facing threshold
    pub threshold: u8,

    /// Rescaled tolerance actually used
    pub tolerance: u8,

    /// Timing breakdown
    pub timings: ProcessingTimings,

    /// Mask statistics after feathering
    pub mask_statistics: MaskStatistics,

    /// When processing finished
    pub processed_at: DateTime<Utc>,
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The bitmap with the mask written into its alpha channel
    pub image: Bitmap,

    /// The final (possibly feathered) mask
    pub mask: OpacityMask,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl RemovalResult {
    /// Encode the result as PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageCodec::encode_png(&self.image)
    }

    /// Encode as PNG and record the encoding time in the metadata
    pub fn to_png_bytes_timed(&mut self) -> Result<Vec<u8>> {
        let start = instant::Instant::now();
        let bytes = ImageCodec::encode_png(&self.image)?;
        self.metadata.timings.encode_ms = Some(start.elapsed().as_millis() as u64);
        Ok(bytes)
    }

    /// Save the result as PNG with alpha channel
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageCodec::save_png(&self.image, path)
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// One-line timing summary for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        let mut summary = format!(
            "Total: {}ms | Mask: {}ms | Feather: {}ms | Composite: {}ms",
            t.total_ms, t.mask_ms, t.feather_ms, t.composite_ms
        );
        if t.refine_ms > 0 {
            summary.push_str(&format!(" | Refine: {}ms", t.refine_ms));
        }
        if let Some(encode_ms) = t.encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}
