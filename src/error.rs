use std::time::Duration;
use thiserror::Error;

use crate::capture::Phase;

/// Errors raised by the capture pipeline
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No recording session is attached to the pipeline
    #[error("No recording session attached; create or select one first")]
    NoSession,

    /// The input device could not be acquired (permission denied, missing file, ...)
    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The intent is not valid in the current phase
    #[error("Cannot {intent} while {from}")]
    InvalidTransition { from: Phase, intent: &'static str },

    /// The segment encoder failed to finalize audio
    #[error("Segment encoder error: {0}")]
    Encoder(String),

    /// A chunk could not be delivered to the session store
    #[error("Failed to upload chunk {chunk_index}: {source}")]
    UploadFailed {
        chunk_index: u32,
        #[source]
        source: StoreError,
    },

    /// A session lifecycle call (create/read/pause/finish/notes) was rejected
    #[error("Session {operation} call failed: {source}")]
    LifecycleCallFailed {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Errors raised by a session store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session store returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}
