use serde::Serialize;

use super::state::Phase;

/// Snapshot of the capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureStats {
    /// Attached recording session, if any
    pub recording_id: Option<String>,

    pub phase: Phase,

    /// Seconds spent recording (display only)
    pub elapsed_secs: u64,

    /// Index the next chunk will receive
    pub next_chunk_index: u32,

    /// Chunks handed to the uploader since attach
    pub chunks_queued: u32,

    pub chunks_uploaded: u32,

    pub chunks_failed: u32,

    /// Chunks queued or in flight
    pub uploads_pending: u32,

    /// Input device name, while one is held
    pub device: Option<String>,
}

impl CaptureStats {
    /// Snapshot with no session attached
    pub fn detached() -> Self {
        Self {
            recording_id: None,
            phase: Phase::Idle,
            elapsed_secs: 0,
            next_chunk_index: 0,
            chunks_queued: 0,
            chunks_uploaded: 0,
            chunks_failed: 0,
            uploads_pending: 0,
            device: None,
        }
    }
}
