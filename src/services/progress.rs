//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pixel pipeline,
//! allowing different frontends to implement their own progress handling.
//! Reports are advisory: the pipeline never waits on a reporter.

use crate::types::ProcessingTimings;
use instant::Instant;

/// Progress stages during background removal processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Decoding input bytes into a bitmap
    ImageLoading,
    /// Building the opacity mask (colour-key and luminance finish here)
    MaskGeneration,
    /// Flood filling from the four corners
    CornerSeedFill,
    /// Flood filling from points along the four edges
    EdgeSeedFill,
    /// Softening the mask boundary
    Feathering,
    /// Writing the mask into the alpha channel
    Compositing,
    /// Smoothing the opaque rim of the cutout
    EdgeRefinement,
    /// Encoding the result as PNG
    Encoding,
    /// Processing completed
    Completed,

    // Batch processing stages
    /// Initializing batch processing
    BatchInitialization,
    /// Processing individual item in batch
    BatchItemProcessing,
    /// Finalizing batch processing
    BatchFinalization,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::MaskGeneration => "Generating opacity mask",
            ProcessingStage::CornerSeedFill => "Flood filling from corners",
            ProcessingStage::EdgeSeedFill => "Flood filling from edges",
            ProcessingStage::Feathering => "Feathering mask edges",
            ProcessingStage::Compositing => "Applying mask to alpha channel",
            ProcessingStage::EdgeRefinement => "Refining cutout edges",
            ProcessingStage::Encoding => "Encoding PNG output",
            ProcessingStage::Completed => "Processing completed",

            ProcessingStage::BatchInitialization => "Initializing batch processing",
            ProcessingStage::BatchItemProcessing => "Processing batch item",
            ProcessingStage::BatchFinalization => "Finalizing batch processing",
        }
    }

    /// Get the fixed progress milestone for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::MaskGeneration => 10,
            ProcessingStage::CornerSeedFill => 30,
            ProcessingStage::EdgeSeedFill => 60,
            ProcessingStage::Feathering => 75,
            ProcessingStage::Compositing => 85,
            ProcessingStage::EdgeRefinement => 90,
            ProcessingStage::Encoding => 95,
            ProcessingStage::Completed => 100,

            // Batch stages use high-level progress values
            ProcessingStage::BatchInitialization => 5,
            ProcessingStage::BatchItemProcessing => 50,
            ProcessingStage::BatchFinalization => 98,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Position of a batch run
#[derive(Debug, Clone)]
pub struct BatchProgressUpdate {
    /// Items finished so far (successes and failures)
    pub items_completed: usize,
    /// Total number of items
    pub items_total: usize,
    /// Items that failed so far
    pub items_failed: usize,
    /// Name of the item about to be processed, if any
    pub current_item_name: Option<String>,
    /// Elapsed time since the batch started (milliseconds)
    pub elapsed_ms: u64,
}

impl BatchProgressUpdate {
    /// Overall batch percentage
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        (self.items_completed * 100 / self.items_total).min(100) as u8
    }
}

/// Trait for reporting progress during background removal operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report the position of a batch run
    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        drop(update);
    }
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show detailed timing information
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Mask: {}ms", timings.mask_ms);
            log::info!("    • Feather: {}ms", timings.feather_ms);
            log::info!("    • Composite: {}ms", timings.composite_ms);
            log::info!("    • Refine: {}ms", timings.refine_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        match update.current_item_name {
            Some(name) => log::info!(
                "[{}/{}] {} ({} failed)",
                update.items_completed + 1,
                update.items_total,
                name,
                update.items_failed
            ),
            None => log::info!(
                "Batch finished: {}/{} processed, {} failed",
                update.items_completed,
                update.items_total,
                update.items_failed
            ),
        }
    }
}

/// Reporter forwarding stage updates to a caller-supplied closure
pub struct CallbackProgressReporter<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgressReporter<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    #[must_use]
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for CallbackProgressReporter<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn report_progress(&self, update: ProgressUpdate) {
        (self.callback)(&update);
    }

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::debug!("{} failed: {}", stage.description(), error);
    }
}

/// Progress tracker that manages timing and progress reporting
///
/// Percentages only ever move forward: a stage whose milestone is below the
/// last reported one is not forwarded.
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
    last_progress: u8,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
            last_progress: 0,
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage; returns false if it would move backwards
    pub fn report_stage(&mut self, stage: ProcessingStage) -> bool {
        let progress = stage.progress_percentage();
        if progress < self.last_progress {
            tracing::trace!(
                stage = stage.description(),
                progress,
                last = self.last_progress,
                "Dropping out-of-order progress update"
            );
            return false;
        }
        self.last_progress = progress;
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
        true
    }

    /// Report completion with final timings
    pub fn report_completion(&mut self, timings: ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error during processing
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::ImageLoading);
        self.reporter.report_error(stage, error);
    }

    /// Forward a batch position update
    pub fn report_batch(&self, update: BatchProgressUpdate) {
        self.reporter.report_batch_progress(update);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }

    /// Last percentage forwarded to the reporter
    #[must_use]
    pub fn last_progress(&self) -> u8 {
        self.last_progress
    }

    /// Start over for the next item, keeping the reporter
    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.current_stage = None;
        self.last_progress = 0;
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .field("last_progress", &self.last_progress)
            .finish_non_exhaustive()
    }
}
