pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod store;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    AudioSourceFactory, BackendAudioSource, InputDevice, Segment, SegmentEncoder,
};
pub use capture::{CaptureConfig, CapturePipeline, CaptureStats, Phase, PipelineEvent, UploadPolicy};
pub use config::Config;
pub use error::{CaptureError, StoreError};
pub use http::{create_router, AppState};
pub use store::{AudioChunk, HttpSessionStore, RecordingSession, RecordingStatus, SessionStore};
