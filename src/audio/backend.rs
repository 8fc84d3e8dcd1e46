use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::file::FileBackend;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame
    pub fn duration(&self) -> Duration {
        let per_second = self.sample_rate as f64 * self.channels.max(1) as f64;
        if per_second == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / per_second)
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

impl AudioBackendConfig {
    /// Number of interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        let frames = self.target_sample_rate as u64 * self.buffer_duration_ms / 1000;
        (frames * self.target_channels.max(1) as u64) as usize
    }
}

/// Audio capture backend trait
///
/// A backend produces live frames from one input device. Implementations:
/// - File: replays a decoded audio file at real-time pace
/// - Silence: emits zeroed frames (smoke tests, no hardware)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Input device selection
#[derive(Debug, Clone)]
pub enum InputDevice {
    /// Replay an audio file (wav, mp3, flac, ogg, m4a)
    File(PathBuf),
    /// Generate silence
    Silence,
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given input device
    pub fn create(device: InputDevice, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match device {
            InputDevice::File(path) => Ok(Box::new(FileBackend::new(path, config))),
            InputDevice::Silence => Ok(Box::new(SilenceBackend::new(config))),
        }
    }
}

/// Backend emitting zeroed frames at real-time pace
pub struct SilenceBackend {
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl SilenceBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self { config, task: None }
    }
}

#[async_trait::async_trait]
impl AudioBackend for SilenceBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(100);
        let config = self.config.clone();
        let frame_len = config.samples_per_frame();

        self.task = Some(tokio::spawn(async move {
            let period = Duration::from_millis(config.buffer_duration_ms.max(1));
            let mut ticker = tokio::time::interval(period);
            let mut timestamp_ms = 0;

            loop {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: vec![0; frame_len],
                    sample_rate: config.target_sample_rate,
                    channels: config.target_channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    debug!("Silence receiver closed");
                    break;
                }
                timestamp_ms += config.buffer_duration_ms;
            }
        }));

        info!(
            "Silence backend started ({}Hz, {} channels)",
            self.config.target_sample_rate, self.config.target_channels
        );

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Silence backend stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "silence"
    }
}

impl Drop for SilenceBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
