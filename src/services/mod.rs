//! Service layer around the pixel pipeline
//!
//! - Codec: encoded bytes to and from bitmaps
//! - Progress: stage reporting for frontends

pub mod codec;
pub mod progress;

pub use codec::ImageCodec;
pub use progress::{
    BatchProgressUpdate, CallbackProgressReporter, ConsoleProgressReporter, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
