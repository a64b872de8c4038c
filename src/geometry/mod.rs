//! Geometry transforms: crop, rotation and proportional batch cropping
//!
//! Every transform consumes a borrowed bitmap and returns a new one.

pub mod batch_crop;
pub mod crop;
pub mod rotate;

pub use batch_crop::{
    batch_crop_bitmaps, batch_crop_items, crop_and_resample, BatchCropOutcome, BatchCropSpec,
    CroppedMember,
};
pub use crop::{centered_aspect_region, crop, crop_to_aspect};
pub use rotate::{rotate90_clockwise, rotate_quarter_turns};
