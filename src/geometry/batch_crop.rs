//! Proportional crop across images of different resolutions
//!
//! A crop region is drawn once against a reference image. Each member image
//! gets the same region scaled by `member_height / reference_height`, clamped
//! into its bounds, and is then resampled to the region's reference size so
//! every output shares one size.

use crate::{
    batch::BatchItem,
    error::{BgRemovalError, Result},
    services::ImageCodec,
    types::{Bitmap, CropRegion},
};
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::instrument;

/// Crop region defined against a reference image, plus the members it applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCropSpec {
    region: CropRegion,
    reference_width: u32,
    reference_height: u32,
    members: BTreeSet<usize>,
}

impl BatchCropSpec {
    /// # Errors
    /// - `InvalidDimensions` for an empty reference
    /// - `InvalidCrop` if the region does not fit the reference
    pub fn new(
        region: CropRegion,
        reference_dimensions: (u32, u32),
        members: impl IntoIterator<Item = usize>,
    ) -> Result<Self> {
        let (reference_width, reference_height) = reference_dimensions;
        if reference_width == 0 || reference_height == 0 {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "reference image is {}x{}",
                reference_width, reference_height
            )));
        }
        region.validate_within(reference_width, reference_height)?;

        Ok(Self {
            region,
            reference_width,
            reference_height,
            members: members.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn region(&self) -> CropRegion {
        self.region
    }

    #[must_use]
    pub fn reference_dimensions(&self) -> (u32, u32) {
        (self.reference_width, self.reference_height)
    }

    /// Whether the member at `index` is cropped
    #[must_use]
    pub fn includes(&self, index: usize) -> bool {
        self.members.contains(&index)
    }

    /// Indices of included members, ascending
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    /// Common size of every cropped output
    #[must_use]
    pub fn output_size(&self) -> (u32, u32) {
        (self.region.width, self.region.height)
    }

    /// Region in a member's own pixels, scaled by height and clamped into bounds
    #[must_use]
    pub fn native_region(&self, member_width: u32, member_height: u32) -> CropRegion {
        let scale = f64::from(member_height) / f64::from(self.reference_height);
        self.region
            .scaled(scale)
            .clamped_to(member_width, member_height)
    }
}

/// Crop one member with its scaled batch region and resample to the output size
pub fn crop_and_resample(spec: &BatchCropSpec, bitmap: &Bitmap) -> Result<Bitmap> {
    let native = spec.native_region(bitmap.width(), bitmap.height());
    let (out_width, out_height) = spec.output_size();

    let source = bitmap.to_rgba_image();
    let cropped = imageops::crop_imm(&source, native.x, native.y, native.width, native.height)
        .to_image();

    let resampled = if (native.width, native.height) == (out_width, out_height) {
        cropped
    } else {
        imageops::resize(&cropped, out_width, out_height, FilterType::Lanczos3)
    };

    tracing::trace!(
        member = %format!("{}x{}", bitmap.width(), bitmap.height()),
        native = %native,
        "Batch crop member"
    );
    Bitmap::from_rgba_image(resampled)
}

/// Apply a batch crop to decoded bitmaps; members not listed come back unchanged
#[instrument(level = "debug", skip_all, fields(count = bitmaps.len(), region = %spec.region()))]
pub fn batch_crop_bitmaps(spec: &BatchCropSpec, bitmaps: Vec<Bitmap>) -> Result<Vec<Bitmap>> {
    bitmaps
        .into_iter()
        .enumerate()
        .map(|(index, bitmap)| {
            if spec.includes(index) {
                crop_and_resample(spec, &bitmap)
            } else {
                Ok(bitmap)
            }
        })
        .collect()
}

/// Output of batch cropping one encoded member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CroppedMember {
    /// Decoded, cropped and resampled
    Cropped(Bitmap),
    /// Original bytes, either not selected or not decodable
    PassedThrough(Vec<u8>),
}

impl CroppedMember {
    #[must_use]
    pub fn is_cropped(&self) -> bool {
        matches!(self, Self::Cropped(_))
    }
}

/// Per-member outputs in input order plus any per-image failures
#[derive(Debug)]
pub struct BatchCropOutcome {
    pub members: Vec<CroppedMember>,
    pub failures: Vec<BgRemovalError>,
}

/// Apply a batch crop to encoded members
///
/// A member that cannot be decoded or cropped is passed through untouched and
/// reported as a `PerImageFailure`; its siblings are unaffected.
#[instrument(level = "debug", skip_all, fields(count = items.len(), region = %spec.region()))]
pub fn batch_crop_items(spec: &BatchCropSpec, items: &[BatchItem]) -> BatchCropOutcome {
    let mut members = Vec::with_capacity(items.len());
    let mut failures = Vec::new();

    for (index, item) in items.iter().enumerate() {
        if !spec.includes(index) {
            members.push(CroppedMember::PassedThrough(item.data.clone()));
            continue;
        }

        match ImageCodec::decode(&item.data).and_then(|bitmap| crop_and_resample(spec, &bitmap)) {
            Ok(cropped) => members.push(CroppedMember::Cropped(cropped)),
            Err(e) => {
                tracing::warn!(index, name = %item.name, error = %e, "Batch crop member passed through");
                failures.push(BgRemovalError::per_image(index, item.name.clone(), &e));
                members.push(CroppedMember::PassedThrough(item.data.clone()));
            },
        }
    }

    BatchCropOutcome { members, failures }
}
