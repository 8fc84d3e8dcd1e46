use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig};
use super::encoder::{InputStream, SegmentEncoder, StreamFormat, WavSegmentEncoder};
use crate::error::CaptureError;

/// Capture capability consumed by the pipeline
///
/// `acquire` takes the input device (the only suspending step), `open_encoder`
/// binds a new segment encoder to the retained input stream, and `release`
/// gives the device back.
#[async_trait::async_trait]
pub trait AudioSource: Send {
    async fn acquire(&mut self) -> Result<(), CaptureError>;

    fn open_encoder(&mut self) -> Result<Box<dyn SegmentEncoder>, CaptureError>;

    async fn release(&mut self);

    fn is_acquired(&self) -> bool;

    fn name(&self) -> &str;
}

/// Builds a fresh `AudioSource` for each attached recording session
pub trait AudioSourceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioSource>, CaptureError>;
}

impl<F> AudioSourceFactory for F
where
    F: Fn() -> Result<Box<dyn AudioSource>, CaptureError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        self()
    }
}

/// `AudioSource` fed by a frame-producing `AudioBackend`
///
/// A pump task moves frames from the backend channel into the shared input
/// stream; encoders opened on this source read from that stream.
pub struct BackendAudioSource {
    backend: Box<dyn AudioBackend>,
    config: AudioBackendConfig,
    stream: Option<InputStream>,
    pump: Option<JoinHandle<()>>,
}

impl BackendAudioSource {
    pub fn new(backend: Box<dyn AudioBackend>, config: AudioBackendConfig) -> Self {
        Self {
            backend,
            config,
            stream: None,
            pump: None,
        }
    }

    /// The live input stream, once the device has been acquired
    pub fn stream(&self) -> Option<&InputStream> {
        self.stream.as_ref()
    }

    fn fallback_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.config.target_sample_rate,
            channels: self.config.target_channels,
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for BackendAudioSource {
    async fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut audio_rx = self
            .backend
            .start()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {:#}", self.backend.name(), e)))?;

        let stream = InputStream::new();
        let sink = stream.clone();
        let name = self.backend.name().to_string();

        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = audio_rx.recv().await {
                sink.push(&frame);
            }
            debug!("Input stream from {} closed", name);
        }));
        self.stream = Some(stream);

        info!("Input device acquired: {}", self.backend.name());

        Ok(())
    }

    fn open_encoder(&mut self) -> Result<Box<dyn SegmentEncoder>, CaptureError> {
        let format = self.fallback_format();
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("input device not acquired".to_string()))?;

        Ok(Box::new(WavSegmentEncoder::open(stream, format)?))
    }

    async fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(stream) = self.stream.take() {
            let (received, discarded) = stream.frame_counts();
            debug!("Input stream released ({} frames, {} discarded)", received, discarded);
        }

        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop audio backend {}: {:#}", self.backend.name(), e);
        }

        info!("Input device released: {}", self.backend.name());
    }

    fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

impl Drop for BackendAudioSource {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
