pub mod backend;
pub mod encoder;
pub mod file;
pub mod source;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, InputDevice, SilenceBackend};
pub use encoder::{encode_wav, InputStream, Segment, SegmentEncoder, StreamFormat, WavSegmentEncoder};
pub use file::{AudioFile, FileBackend};
pub use source::{AudioSource, AudioSourceFactory, BackendAudioSource};
