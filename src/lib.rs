#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! # nobg
//!
//! Color, luminance and connectivity based background removal for raster images.
//!
//! Given an RGBA bitmap, `nobg` computes a per-pixel opacity mask separating a
//! subject from its background, optionally feathers the mask boundary, writes
//! the mask into the alpha channel and optionally smooths the cutout rim. No
//! model downloads and no inference runtime: every strategy is a deterministic
//! pixel loop.
//!
//! ## Features
//!
//! - **Three mask strategies**: edge-seeded flood fill, color key, luminance cutoff
//! - **Boundary-only filters**: Gaussian feathering of the mask, RGBA rim refinement
//! - **Geometry**: explicit and aspect-ratio crops, quarter-turn rotation,
//!   proportional batch crop with resampling across mixed resolutions
//! - **Batch processing**: ordered, cancellable, per-item failure isolation
//! - **Progress reporting**: fixed stage milestones through [`ProgressTracker`]
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nobg::{remove_background_from_bytes, RemovalConfig, SegmentationMethod};
//!
//! # fn example(upload: &[u8]) -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .method(SegmentationMethod::EdgeDetect)
//!     .threshold(30)
//!     .feather_radius(2)
//!     .build()?;
//!
//! let result = remove_background_from_bytes(upload, &config)?;
//! result.save_png("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and subscriber setup
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log formatting for the CLI
//!
//! To use only as a library:
//!
//! ```toml
//! [dependencies]
//! nobg = { version = "0.1", default-features = false }
//! ```

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod mask;
pub mod processor;
pub mod services;
pub mod store;
pub mod tracing_config;
pub mod types;

use tokio::io::AsyncRead;

// Public API exports
pub use batch::{
    run_in_order, BatchItem, BatchItemResult, BatchItemStatus, BatchPosition, BatchProcessor,
    BatchReport, CancellationToken,
};
pub use compositor::{apply_mask, apply_mask_owned};
pub use config::{
    AspectRatio, BackgroundColor, FeatherRadius, RefineRadius, RemovalConfig,
    RemovalConfigBuilder, SegmentationMethod, Threshold,
};
pub use error::{BgRemovalError, Result};
pub use filters::{feather_mask, refine_edges};
pub use geometry::{
    batch_crop_bitmaps, batch_crop_items, centered_aspect_region, crop, crop_and_resample,
    crop_to_aspect, rotate90_clockwise, rotate_quarter_turns, BatchCropOutcome, BatchCropSpec,
    CroppedMember,
};
pub use mask::{
    corner_median, create_generator, ColorKeyGenerator, EdgeDetectGenerator, LuminanceGenerator,
    MaskGenerator,
};
pub use processor::SegmentationPipeline;
pub use services::{
    BatchProgressUpdate, CallbackProgressReporter, ConsoleProgressReporter, ImageCodec,
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use store::{BlobStore, BlobStoreStats, MemoryBlobStore};
pub use types::{
    Bitmap, CropRegion, MaskStatistics, OpacityMask, ProcessingMetadata, ProcessingTimings,
    RemovalResult,
};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};

/// Remove the background from an encoded image
///
/// Accepts any format the `image` crate is built with (PNG, JPEG, WebP, ...).
///
/// # Examples
///
/// ```rust,no_run
/// use nobg::{remove_background_from_bytes, RemovalConfig};
///
/// # fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = RemovalConfig::builder().threshold(40).build()?;
/// let result = remove_background_from_bytes(&upload_bytes, &config)?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    SegmentationPipeline::new(config.clone())?.process_bytes(image_bytes)
}

/// Remove the background from an already decoded bitmap
///
/// The source bitmap is left untouched.
pub fn remove_background_from_bitmap(
    bitmap: &Bitmap,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    SegmentationPipeline::new(config.clone())?.process_bitmap(bitmap)
}

/// Remove the background from an async reader stream
///
/// The stream is read to the end before decoding.
///
/// # Examples
///
/// ```rust,no_run
/// use nobg::{remove_background_from_reader, RemovalConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("portrait.jpg").await?;
/// let result = remove_background_from_reader(file, &RemovalConfig::default()).await?;
/// result.save_png("portrait_bg_removed.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut pipeline = SegmentationPipeline::new(config.clone())?;
    pipeline.process_reader(reader).await
}
