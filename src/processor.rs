//! Segmentation pipeline
//!
//! `SegmentationPipeline` runs mask generation, optional feathering,
//! compositing and optional edge refinement for one bitmap at a time. It keeps
//! no pixel state between calls; the same pipeline can process any number of
//! images in sequence.

use crate::{
    compositor,
    config::RemovalConfig,
    error::Result,
    filters::{feather_mask, refine_edges},
    mask::{create_generator, MaskGenerator},
    services::{ImageCodec, ProcessingStage, ProgressTracker},
    tracing_config::spans,
    types::{Bitmap, OpacityMask, ProcessingMetadata, ProcessingTimings, RemovalResult},
};
use chrono::Utc;
use instant::Instant;
use log::debug;
use std::path::Path;
use tracing::{info as trace_info, span, Level};

/// Orchestrates mask generation, feathering, compositing and refinement
pub struct SegmentationPipeline {
    config: RemovalConfig,
    generator: Box<dyn MaskGenerator>,
    progress_tracker: Option<ProgressTracker>,
}

impl SegmentationPipeline {
    /// Create a pipeline; out-of-range configuration fields are clamped
    pub fn new(config: RemovalConfig) -> Result<Self> {
        let generator = create_generator(config.method, config.background_color);
        Self::with_generator(config, generator)
    }

    /// Create a pipeline with a caller-supplied mask generator
    ///
    /// The configuration's method is ignored; its threshold, feather and
    /// refinement settings still apply.
    pub fn with_generator(config: RemovalConfig, generator: Box<dyn MaskGenerator>) -> Result<Self> {
        let config = config.normalized();
        debug!(
            "Segmentation pipeline: {} (threshold {}, feather {}, refine {:?})",
            generator.name(),
            config.threshold.value(),
            config.feather_radius,
            config.refine_radius.map(|r| r.get())
        );
        Ok(Self {
            config,
            generator,
            progress_tracker: None,
        })
    }

    /// Attach a progress tracker
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    /// Replace or remove the progress tracker
    pub fn set_progress_tracker(&mut self, tracker: Option<ProgressTracker>) {
        self.progress_tracker = tracker;
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Name of the active mask generator
    #[must_use]
    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Start a fresh progress sequence for one entry-point call
    fn begin_run(&mut self) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.reset();
        }
    }

    fn report(&mut self, stage: ProcessingStage) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_stage(stage);
        }
    }

    fn report_failure(&self, error: &crate::error::BgRemovalError) {
        if let Some(tracker) = self.progress_tracker.as_ref() {
            tracker.report_error(&error.to_string());
        }
    }

    /// Remove the background from a decoded bitmap
    ///
    /// # Errors
    /// Mask and compositing errors; the source bitmap is never modified.
    pub fn process_bitmap(&mut self, bitmap: &Bitmap) -> Result<RemovalResult> {
        self.begin_run();
        self.run(bitmap, false).map(|(result, _)| result)
    }

    /// Decode `bytes` and remove the background
    ///
    /// # Errors
    /// - `Decode` when the bytes are not a supported image
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<RemovalResult> {
        self.begin_run();
        let bitmap = self.decode(bytes)?;
        self.run(&bitmap, false).map(|(result, _)| result)
    }

    /// Decode, remove the background and encode the result as PNG
    pub fn process_bytes_to_png(&mut self, bytes: &[u8]) -> Result<(RemovalResult, Vec<u8>)> {
        self.begin_run();
        let bitmap = self.decode(bytes)?;
        let (result, png) = self.run(&bitmap, true)?;
        let png = png.ok_or_else(|| crate::error::BgRemovalError::internal("PNG output missing"))?;
        Ok((result, png))
    }

    /// Load an image file and remove the background
    pub fn process_file<P: AsRef<Path>>(&mut self, path: P) -> Result<RemovalResult> {
        self.begin_run();
        self.report(ProcessingStage::ImageLoading);
        let bitmap = ImageCodec::load(path).map_err(|e| {
            self.report_failure(&e);
            e
        })?;
        self.run(&bitmap, false).map(|(result, _)| result)
    }

    /// Read an async stream to the end, then process it like [`process_bytes`](Self::process_bytes)
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
    ) -> Result<RemovalResult> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        self.process_bytes(&buffer)
    }

    /// Build the (possibly feathered) mask without compositing
    pub fn generate_mask(&mut self, bitmap: &Bitmap) -> Result<OpacityMask> {
        let tolerance = self.config.threshold.tolerance();
        let mask = self.generator.generate(bitmap, tolerance)?;
        Ok(match self.config.feather() {
            Some(radius) => feather_mask(&mask, radius),
            None => mask,
        })
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Bitmap> {
        self.report(ProcessingStage::ImageLoading);
        ImageCodec::decode(bytes).map_err(|e| {
            self.report_failure(&e);
            e
        })
    }

    fn run(&mut self, bitmap: &Bitmap, encode: bool) -> Result<(RemovalResult, Option<Vec<u8>>)> {
        let _span = spans::segmentation(self.generator.name(), bitmap.dimensions()).entered();
        let outcome = self.run_stages(bitmap, encode);
        if let Err(ref e) = outcome {
            self.report_failure(e);
        }
        outcome
    }

    fn run_stages(&mut self, bitmap: &Bitmap, encode: bool) -> Result<(RemovalResult, Option<Vec<u8>>)> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let tolerance = self.config.threshold.tolerance();

        trace_info!(
            threshold = self.config.threshold.value(),
            tolerance,
            "Starting segmentation"
        );

        // Mask generation
        let mask = {
            let _span = span!(Level::DEBUG, "mask_generation", tolerance).entered();
            let start = Instant::now();
            let generator = &self.generator;
            let tracker = &mut self.progress_tracker;
            let mask = generator.generate_with_progress(bitmap, tolerance, &mut |stage| {
                if let Some(tracker) = tracker.as_mut() {
                    tracker.report_stage(stage);
                }
            })?;
            timings.mask_ms = start.elapsed().as_millis() as u64;
            mask
        };
        self.debug_statistics("mask", &mask);

        // Feathering
        let mask = match self.config.feather() {
            Some(radius) => {
                self.report(ProcessingStage::Feathering);
                let _span = span!(Level::DEBUG, "feathering", radius = radius.get()).entered();
                let start = Instant::now();
                let feathered = feather_mask(&mask, radius);
                timings.feather_ms = start.elapsed().as_millis() as u64;
                self.debug_statistics("feathered mask", &feathered);
                feathered
            },
            None => mask,
        };

        // Compositing
        self.report(ProcessingStage::Compositing);
        let start = Instant::now();
        let mut image = compositor::apply_mask(bitmap, &mask)?;
        timings.composite_ms = start.elapsed().as_millis() as u64;

        // Edge refinement
        if let Some(radius) = self.config.refine_radius {
            self.report(ProcessingStage::EdgeRefinement);
            let _span = span!(Level::DEBUG, "edge_refinement", radius = radius.get()).entered();
            let start = Instant::now();
            image = refine_edges(&image, radius);
            timings.refine_ms = start.elapsed().as_millis() as u64;
        }

        let png = if encode {
            self.report(ProcessingStage::Encoding);
            let start = Instant::now();
            let bytes = ImageCodec::encode_png(&image)?;
            timings.encode_ms = Some(start.elapsed().as_millis() as u64);
            Some(bytes)
        } else {
            None
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;

        let metadata = ProcessingMetadata {
            method: self.generator.name().to_string(),
            threshold: self.config.threshold.value(),
            tolerance,
            timings: timings.clone(),
            mask_statistics: mask.statistics(),
            processed_at: Utc::now(),
        };

        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_completion(timings);
        }

        let result = RemovalResult {
            image,
            mask,
            metadata,
        };
        trace_info!(timings = %result.timing_summary(), "Segmentation finished");

        Ok((result, png))
    }

    fn debug_statistics(&self, label: &str, mask: &OpacityMask) {
        if self.config.debug {
            let stats = mask.statistics();
            debug!(
                "{}: {} transparent, {} opaque, {} partial ({:.1}% transparent)",
                label,
                stats.transparent_pixels,
                stats.opaque_pixels,
                stats.partial_pixels,
                stats.transparent_ratio * 100.0
            );
        }
    }
}

impl std::fmt::Debug for SegmentationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationPipeline")
            .field("config", &self.config)
            .field("generator", &self.generator.name())
            .field("progress_tracker", &self.progress_tracker)
            .finish()
    }
}
