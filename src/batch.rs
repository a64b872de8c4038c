//! Sequential batch background removal
//!
//! Items are processed strictly in input order. A failing item is recorded
//! and the batch moves on; cancellation is checked before each item starts.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    processor::SegmentationPipeline,
    services::{BatchProgressUpdate, ProcessingStage, ProgressTracker},
    tracing_config::{events, spans},
};
use chrono::{DateTime, Utc};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// One encoded input image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub data: Vec<u8>,
}

impl BatchItem {
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Shared flag for stopping a batch between items
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the current item still finishes
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemStatus {
    Success {
        #[serde(skip)]
        png: Vec<u8>,
    },
    Failed {
        error: String,
    },
    Skipped,
}

/// Outcome for one item, in input position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: BatchItemStatus,
}

impl BatchItemResult {
    /// PNG output for successful items
    #[must_use]
    pub fn png(&self) -> Option<&[u8]> {
        match &self.status {
            BatchItemStatus::Success { png } => Some(png),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, BatchItemStatus::Success { .. })
    }
}

/// Aggregate result of a batch run; PNG payloads are not serialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<BatchItemResult>,
    pub cancelled: bool,
    pub total_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl BatchReport {
    /// Successful items in input order
    pub fn succeeded(&self) -> impl Iterator<Item = &BatchItemResult> {
        self.items.iter().filter(|item| item.is_success())
    }

    /// Failed items in input order
    pub fn failed(&self) -> impl Iterator<Item = &BatchItemResult> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, BatchItemStatus::Failed { .. }))
    }

    /// Items never started because the batch was cancelled
    pub fn skipped(&self) -> impl Iterator<Item = &BatchItemResult> {
        self.items
            .iter()
            .filter(|item| item.status == BatchItemStatus::Skipped)
    }

    /// Per-item failures as errors
    #[must_use]
    pub fn failures(&self) -> Vec<BgRemovalError> {
        self.items
            .iter()
            .filter_map(|item| match &item.status {
                BatchItemStatus::Failed { error } => Some(BgRemovalError::PerImageFailure {
                    index: item.index,
                    name: item.name.clone(),
                    message: error.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize batch report: {}", e)))
    }
}

/// Runs the segmentation pipeline over a list of items
pub struct BatchProcessor {
    pipeline: SegmentationPipeline,
    batch_tracker: Option<ProgressTracker>,
    cancellation: CancellationToken,
}

impl BatchProcessor {
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Ok(Self::from_pipeline(SegmentationPipeline::new(config)?))
    }

    #[must_use]
    pub fn from_pipeline(pipeline: SegmentationPipeline) -> Self {
        Self {
            pipeline,
            batch_tracker: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Tracker receiving batch-level position updates
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.batch_tracker = Some(tracker);
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that cancels this processor's runs
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn pipeline_mut(&mut self) -> &mut SegmentationPipeline {
        &mut self.pipeline
    }

    fn report_batch(&self, update: BatchProgressUpdate) {
        if let Some(tracker) = self.batch_tracker.as_ref() {
            tracker.report_batch(update);
        }
    }

    /// Process every item in order
    ///
    /// Never fails as a whole: per-item errors land in the report.
    #[instrument(skip_all, fields(items = items.len()))]
    pub fn process(&mut self, items: &[BatchItem]) -> BatchReport {
        if let Some(tracker) = self.batch_tracker.as_mut() {
            tracker.report_stage(ProcessingStage::BatchInitialization);
        }

        let pipeline = &mut self.pipeline;
        let batch_tracker = &self.batch_tracker;
        let report = run_in_order(
            items,
            &self.cancellation,
            |item| item.name.clone(),
            |position, item| {
                if let Some(tracker) = batch_tracker {
                    tracker.report_batch(position.progress_update());
                }

                let _span = spans::batch_item(position.index, position.name).entered();
                pipeline
                    .process_bytes_to_png(&item.data)
                    .map(|(_, png)| png)
                    .map_err(|e| {
                        let failure = BgRemovalError::per_image(position.index, position.name, &e);
                        events::error_with_context(&failure, "batch item");
                        e
                    })
            },
        );

        if let Some(tracker) = self.batch_tracker.as_mut() {
            tracker.report_stage(ProcessingStage::BatchFinalization);
        }
        self.report_batch(BatchProgressUpdate {
            items_completed: report.items.len() - report.skipped().count(),
            items_total: report.items.len(),
            items_failed: report.failed().count(),
            current_item_name: None,
            elapsed_ms: report.total_ms,
        });

        report
    }
}

/// Where a batch run stands when an item is about to start
#[derive(Debug, Clone, Copy)]
pub struct BatchPosition<'a> {
    pub index: usize,
    pub total: usize,
    /// Items failed so far
    pub failed: usize,
    pub name: &'a str,
    pub elapsed_ms: u64,
}

impl BatchPosition<'_> {
    #[must_use]
    pub fn progress_update(&self) -> BatchProgressUpdate {
        BatchProgressUpdate {
            items_completed: self.index,
            items_total: self.total,
            items_failed: self.failed,
            current_item_name: Some(self.name.to_string()),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Run `process` over `items` strictly in input order
///
/// Cancellation is checked before each item; once it is set, every remaining
/// item is recorded as skipped. A failing item is recorded with its error and
/// the run moves on. `process` returns the encoded output to keep in the report.
pub fn run_in_order<T, E, N, F>(
    items: &[T],
    cancellation: &CancellationToken,
    mut name_of: N,
    mut process: F,
) -> BatchReport
where
    E: std::fmt::Display,
    N: FnMut(&T) -> String,
    F: FnMut(BatchPosition<'_>, &T) -> std::result::Result<Vec<u8>, E>,
{
    let started_at = Utc::now();
    let start = Instant::now();
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0;
    let mut cancelled = false;

    for (index, item) in items.iter().enumerate() {
        let name = name_of(item);

        if cancellation.is_cancelled() {
            if !cancelled {
                tracing::info!(index, "Batch cancelled, skipping remaining items");
            }
            cancelled = true;
            results.push(BatchItemResult {
                index,
                name,
                status: BatchItemStatus::Skipped,
            });
            continue;
        }

        let position = BatchPosition {
            index,
            total,
            failed,
            name: &name,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        let status = match process(position, item) {
            Ok(png) => BatchItemStatus::Success { png },
            Err(e) => {
                failed += 1;
                BatchItemStatus::Failed {
                    error: e.to_string(),
                }
            },
        };

        results.push(BatchItemResult {
            index,
            name,
            status,
        });
    }

    BatchReport {
        items: results,
        cancelled,
        total_ms: start.elapsed().as_millis() as u64,
        started_at,
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("pipeline", &self.pipeline)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ImageCodec;
    use crate::types::Bitmap;

    fn png(color: [u8; 4]) -> Vec<u8> {
        let mut bitmap = Bitmap::filled(12, 12, [255, 255, 255, 255]).unwrap();
        for y in 4..8 {
            for x in 4..8 {
                bitmap.set_pixel(x, y, color);
            }
        }
        ImageCodec::encode_png(&bitmap).unwrap()
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let items = vec![
            BatchItem::new("one.png", png([200, 0, 0, 255])),
            BatchItem::new("broken.jpg", vec![0xFF, 0xD8, 0x00]),
            BatchItem::new("three.png", png([0, 0, 200, 255])),
        ];

        let mut processor = BatchProcessor::new(RemovalConfig::default()).unwrap();
        let report = processor.process(&items);

        assert_eq!(report.items.len(), 3);
        assert_eq!(
            report.items.iter().map(|i| i.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(report.failed().count(), 1);
        assert!(!report.cancelled);

        let failures = report.failures();
        assert!(failures[0].is_per_image());
        assert!(failures[0].to_string().contains("broken.jpg"));

        let decoded = ImageCodec::decode(report.items[2].png().unwrap()).unwrap();
        assert_eq!(decoded.pixel(5, 5), Some([0, 0, 200, 255]));
    }

    #[test]
    fn test_cancellation_skips_remaining() {
        let items: Vec<_> = (0..4)
            .map(|i| BatchItem::new(format!("{i}.png"), png([0, 0, 0, 255])))
            .collect();

        let mut processor = BatchProcessor::new(RemovalConfig::default()).unwrap();
        processor.cancellation_token().cancel();
        let report = processor.process(&items);

        assert!(report.cancelled);
        assert_eq!(report.skipped().count(), 4);
        assert_eq!(report.succeeded().count(), 0);
    }

    #[test]
    fn test_report_json_omits_payload() {
        let items = vec![
            BatchItem::new("ok.png", png([10, 200, 10, 255])),
            BatchItem::new("bad.png", b"nope".to_vec()),
        ];
        let mut processor = BatchProcessor::new(RemovalConfig::default()).unwrap();
        let json = processor.process(&items).to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["items"][0]["status"], "success");
        assert!(value["items"][0].get("png").is_none());
        assert_eq!(value["items"][1]["status"], "failed");
        assert_eq!(value["items"][1]["name"], "bad.png");
        assert!(value["items"][1]["error"].as_str().unwrap().contains("Decode"));
    }

    #[test]
    fn test_run_in_order_records_positions() {
        let token = CancellationToken::new();
        let mut seen = Vec::new();
        let report = run_in_order(
            &["a", "b", "c", "d"],
            &token,
            |name| (*name).to_string(),
            |position, name| {
                seen.push((position.index, position.failed, position.name.to_string()));
                if *name == "b" {
                    return Err("unreadable");
                }
                if *name == "c" {
                    token.cancel();
                }
                Ok(name.as_bytes().to_vec())
            },
        );

        assert_eq!(
            seen,
            vec![
                (0, 0, "a".to_string()),
                (1, 0, "b".to_string()),
                (2, 1, "c".to_string()),
            ]
        );
        assert!(report.cancelled);
        assert_eq!(report.items[0].png(), Some(&b"a"[..]));
        assert_eq!(
            report.items[1].status,
            BatchItemStatus::Failed {
                error: "unreadable".to_string()
            }
        );
        assert!(report.items[2].is_success());
        assert_eq!(report.items[3].status, BatchItemStatus::Skipped);
        assert_eq!(report.items[3].name, "d");
    }

    #[test]
    fn test_empty_batch() {
        let mut processor = BatchProcessor::new(RemovalConfig::default()).unwrap();
        let report = processor.process(&[]);
        assert!(report.items.is_empty());
        assert!(!report.cancelled);
    }
}
