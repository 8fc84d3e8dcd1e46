//! Capture pipeline
//!
//! Turns a live input stream into fixed-length audio chunks and delivers them
//! to the session store in order, while tracking the recording lifecycle.

mod config;
mod pipeline;
mod rotator;
mod state;
mod stats;
mod uploader;

pub use config::{CaptureConfig, UploadPolicy};
pub use pipeline::{CapturePipeline, RecordingCallback};
pub use state::{Phase, PipelineEvent};
pub use stats::CaptureStats;
pub use uploader::{UploadStats, Uploader};
