// Shared fakes for integration tests: an in-memory session store and test-driven input devices
#![allow(dead_code)]

use anyhow::Result;
use scribe_capture::audio::{
    AudioBackend, AudioBackendConfig, AudioFrame, AudioSource, AudioSourceFactory,
    BackendAudioSource, InputStream, Segment, SegmentEncoder, StreamFormat, WavSegmentEncoder,
};
use scribe_capture::store::{AudioChunk, ChunkReceipt, RecordingSession, RecordingStatus, SessionStore};
use scribe_capture::{CaptureConfig, CaptureError, CapturePipeline, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SAMPLE_RATE: u32 = 16000;

pub fn session(id: &str, status: RecordingStatus, chunk_count: u32) -> RecordingSession {
    RecordingSession {
        id: id.to_string(),
        user_id: Some("user-1".to_string()),
        status,
        created_at: None,
        updated_at: None,
        chunk_count,
        notes: None,
        transcription_text: None,
        audio_file_path: None,
        llm_provider: None,
    }
}

/// An uploaded chunk as seen by the store
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub recording_id: String,
    pub chunk_index: u32,
    pub duration_seconds: f64,
    pub payload_len: usize,
}

// ============================================================================
// FakeStore
// ============================================================================

/// In-memory session store with failure injection
#[derive(Default)]
pub struct FakeStore {
    sessions: Mutex<HashMap<String, RecordingSession>>,
    uploads: Mutex<Vec<StoredChunk>>,
    /// Lifecycle calls and upload attempts, in call order
    calls: Mutex<Vec<String>>,
    /// Chunk indices whose uploads always fail
    failing_chunks: Mutex<HashSet<u32>>,
    /// Remaining failures per chunk index before an upload succeeds
    flaky_chunks: Mutex<HashMap<u32, u32>>,
    pub fail_finish: AtomicBool,
    pub fail_pause: AtomicBool,
    upload_delay: Mutex<Duration>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    next_id: AtomicU32,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, session: RecordingSession) {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<RecordingSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Change a session's status behind the pipeline's back
    pub fn set_status(&self, id: &str, status: RecordingStatus) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id) {
            session.status = status;
        }
    }

    pub fn fail_chunk(&self, index: u32) {
        self.failing_chunks.lock().unwrap().insert(index);
    }

    pub fn flaky_chunk(&self, index: u32, failures: u32) {
        self.flaky_chunks.lock().unwrap().insert(index, failures);
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = delay;
    }

    pub fn uploads(&self) -> Vec<StoredChunk> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_indices(&self) -> Vec<u32> {
        self.uploads().iter().map(|c| c.chunk_index).collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&mut RecordingSession),
    ) -> Result<RecordingSession, StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(id).ok_or_else(|| StoreError::Status {
            status: 404,
            detail: "Recording not found".to_string(),
        })?;
        apply(session);
        Ok(session.clone())
    }
}

#[async_trait::async_trait]
impl SessionStore for FakeStore {
    async fn create_session(&self) -> Result<RecordingSession, StoreError> {
        self.record("create");
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let created = session(&id, RecordingStatus::Active, 0);
        self.insert(created.clone());
        Ok(created)
    }

    async fn read_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.record("read");
        self.update(id, |_| {})
    }

    async fn pause_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.record("pause");
        if self.fail_pause.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("pause rejected".to_string()));
        }
        self.update(id, |s| s.status = RecordingStatus::Paused)
    }

    async fn finish_session(&self, id: &str) -> Result<RecordingSession, StoreError> {
        self.record("finish");
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 500,
                detail: "Failed to finish recording".to_string(),
            });
        }
        self.update(id, |s| s.status = RecordingStatus::Ended)
    }

    async fn upload_chunk(&self, chunk: &AudioChunk) -> Result<ChunkReceipt, StoreError> {
        self.record(format!("upload {}", chunk.chunk_index));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.upload_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_chunks.lock().unwrap().contains(&chunk.chunk_index) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        if let Some(remaining) = self.flaky_chunks.lock().unwrap().get_mut(&chunk.chunk_index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable("temporary failure".to_string()));
            }
        }

        let ended = self
            .get(&chunk.recording_id)
            .map(|s| s.is_ended())
            .unwrap_or(true);
        if ended {
            return Err(StoreError::Status {
                status: 400,
                detail: "Recording is not active".to_string(),
            });
        }

        self.update(&chunk.recording_id, |s| s.chunk_count += 1)?;
        self.uploads.lock().unwrap().push(StoredChunk {
            recording_id: chunk.recording_id.clone(),
            chunk_index: chunk.chunk_index,
            duration_seconds: chunk.duration_seconds,
            payload_len: chunk.payload.len(),
        });

        Ok(ChunkReceipt {
            message: Some("Chunk uploaded successfully".to_string()),
            chunk_id: None,
            chunk_index: chunk.chunk_index,
            file_size: Some(chunk.payload.len() as u64),
        })
    }

    async fn update_notes(&self, id: &str, notes: &str) -> Result<RecordingSession, StoreError> {
        self.record("notes");
        self.update(id, |s| s.notes = Some(notes.to_string()))
    }
}

// ============================================================================
// TestDevice
// ============================================================================

/// Input device whose stream is fed directly by the test
#[derive(Default)]
pub struct TestDevice {
    pub stream: InputStream,
    pub fail_acquire: AtomicBool,
    /// Encoders opened while set fail to finalize
    pub fail_encoder: AtomicBool,
    acquires: AtomicU32,
    releases: AtomicU32,
    held: AtomicBool,
}

impl TestDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push `seconds` of mono 16 kHz audio in 100 ms frames
    pub fn speak(&self, seconds: f64) {
        let frames = (seconds * 10.0).round() as usize;
        for i in 0..frames {
            self.stream.push(&AudioFrame {
                samples: vec![(i % 100) as i16; SAMPLE_RATE as usize / 10],
                sample_rate: SAMPLE_RATE,
                channels: 1,
                timestamp_ms: i as u64 * 100,
            });
        }
    }

    pub fn acquires(&self) -> u32 {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn AudioSourceFactory> {
        let device = Arc::clone(self);
        Arc::new(move || -> Result<Box<dyn AudioSource>, CaptureError> {
            Ok(Box::new(TestSource {
                device: Arc::clone(&device),
                acquired: false,
            }))
        })
    }
}

struct TestSource {
    device: Arc<TestDevice>,
    acquired: bool,
}

#[async_trait::async_trait]
impl AudioSource for TestSource {
    async fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.device.fail_acquire.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("microphone permission denied".to_string()));
        }
        self.device.acquires.fetch_add(1, Ordering::SeqCst);
        self.device.held.store(true, Ordering::SeqCst);
        self.acquired = true;
        Ok(())
    }

    fn open_encoder(&mut self) -> Result<Box<dyn SegmentEncoder>, CaptureError> {
        let format = StreamFormat {
            sample_rate: SAMPLE_RATE,
            channels: 1,
        };
        let encoder = WavSegmentEncoder::open(&self.device.stream, format)?;
        if self.device.fail_encoder.load(Ordering::SeqCst) {
            return Ok(Box::new(BrokenEncoder { _inner: encoder }));
        }
        Ok(Box::new(encoder))
    }

    async fn release(&mut self) {
        if self.acquired {
            self.acquired = false;
            self.device.releases.fetch_add(1, Ordering::SeqCst);
            self.device.held.store(false, Ordering::SeqCst);
        }
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }

    fn name(&self) -> &str {
        "test device"
    }
}

impl Drop for TestSource {
    fn drop(&mut self) {
        if self.acquired {
            self.device.releases.fetch_add(1, Ordering::SeqCst);
            self.device.held.store(false, Ordering::SeqCst);
        }
    }
}

/// Holds the stream tap like a real encoder but cannot produce a segment
struct BrokenEncoder {
    _inner: WavSegmentEncoder,
}

impl SegmentEncoder for BrokenEncoder {
    fn flush(&mut self) -> Result<Segment, CaptureError> {
        Err(CaptureError::Encoder("disk full".to_string()))
    }

    fn close(self: Box<Self>) -> Result<Option<Segment>, CaptureError> {
        Err(CaptureError::Encoder("disk full".to_string()))
    }
}

// ============================================================================
// ChannelBackend
// ============================================================================

/// Frame-producing backend driven through a test-held sender
#[derive(Clone, Default)]
pub struct ChannelBackend {
    sender: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    pub stops: Arc<AtomicU32>,
}

impl ChannelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender for the running capture, once started
    pub fn sender(&self) -> Option<mpsc::Sender<AudioFrame>> {
        self.sender.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(100);
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.sender.lock().unwrap().take();
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Pipeline whose sources wrap clones of `backend`
pub fn backend_pipeline(store: &Arc<FakeStore>, backend: &ChannelBackend) -> CapturePipeline {
    let backend = backend.clone();
    let sources = move || -> Result<Box<dyn AudioSource>, CaptureError> {
        Ok(Box::new(BackendAudioSource::new(
            Box::new(backend.clone()),
            backend_config(),
        )))
    };
    CapturePipeline::new(store.clone(), Arc::new(sources), CaptureConfig::default())
}

/// 100 ms of constant mono audio
pub fn frame(i: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![100; SAMPLE_RATE as usize / 10],
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms: i * 100,
    }
}

pub fn backend_config() -> AudioBackendConfig {
    AudioBackendConfig {
        target_sample_rate: SAMPLE_RATE,
        target_channels: 1,
        buffer_duration_ms: 100,
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

pub fn pipeline(store: &Arc<FakeStore>, device: &Arc<TestDevice>, config: CaptureConfig) -> CapturePipeline {
    CapturePipeline::new(store.clone(), device.factory(), config)
}

pub fn total_duration(chunks: &[StoredChunk]) -> f64 {
    chunks.iter().map(|c| c.duration_seconds).sum()
}
