use crate::capture::CapturePipeline;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single capture pipeline driven by this server
    pub pipeline: CapturePipeline,
}

impl AppState {
    pub fn new(pipeline: CapturePipeline) -> Self {
        Self { pipeline }
    }
}
