use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::rotator::TimerHandle;
use super::stats::CaptureStats;
use super::uploader::Uploader;
use crate::audio::{AudioSource, Segment, SegmentEncoder};
use crate::error::CaptureError;
use crate::store::{AudioChunk, RecordingSession};

/// Lifecycle phase of the capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Recording,
    Paused,
    Ending,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Ending => "ending",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Notifications for a presentation layer
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PhaseChanged {
        recording_id: String,
        phase: Phase,
    },
    /// A lifecycle call returned a fresh snapshot of the session
    RecordingUpdated(RecordingSession),
    ChunkQueued {
        chunk_index: u32,
        duration_seconds: f64,
    },
    ChunkUploaded {
        chunk_index: u32,
    },
    ChunkFailed {
        chunk_index: u32,
        error: String,
    },
    LifecycleFailed {
        operation: &'static str,
        error: String,
    },
    /// A segment could not be finalized; its audio is lost
    EncoderFailed {
        error: String,
    },
    Elapsed {
        seconds: u64,
    },
    Detached {
        recording_id: String,
    },
}

pub(crate) type SharedState = Arc<Mutex<Option<CaptureState>>>;
pub(crate) type WeakState = Weak<Mutex<Option<CaptureState>>>;

/// Per-session capture state; lives from attach until detach or replacement
pub(crate) struct CaptureState {
    pub recording_id: String,
    pub phase: Phase,
    /// Index of the next chunk; never reused or skipped within a session
    pub next_chunk_index: u32,
    pub elapsed: Duration,
    /// Input device, exclusively owned by this state
    pub source: Option<Box<dyn AudioSource>>,
    /// Active encoder; at most one at a time
    pub encoder: Option<Box<dyn SegmentEncoder>>,
    pub rotator: Option<TimerHandle>,
    pub ticker: Option<TimerHandle>,
    /// Epoch of the armed timers; `None` once cancelled
    pub timer_epoch: Option<u64>,
    pub uploader: Uploader,
    pub chunks_queued: u32,
    pub events: broadcast::Sender<PipelineEvent>,
    /// Lock-free mirror of `snapshot`, readable while an intent holds the lock
    pub stats: Arc<watch::Sender<CaptureStats>>,
}

impl CaptureState {
    pub fn new(
        session: &RecordingSession,
        next_chunk_index: u32,
        uploader: Uploader,
        events: broadcast::Sender<PipelineEvent>,
        stats: Arc<watch::Sender<CaptureStats>>,
    ) -> Self {
        let phase = if session.is_ended() { Phase::Ended } else { Phase::Idle };

        Self {
            recording_id: session.id.clone(),
            phase,
            next_chunk_index,
            elapsed: Duration::ZERO,
            source: None,
            encoder: None,
            rotator: None,
            ticker: None,
            timer_epoch: None,
            uploader,
            chunks_queued: 0,
            events,
            stats,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        info!("Recording {}: {} -> {}", self.recording_id, self.phase, phase);
        self.phase = phase;
        self.emit(PipelineEvent::PhaseChanged {
            recording_id: self.recording_id.clone(),
            phase,
        });
        self.publish_stats();
    }

    pub fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> CaptureStats {
        let uploads = self.uploader.stats();
        CaptureStats {
            recording_id: Some(self.recording_id.clone()),
            phase: self.phase,
            elapsed_secs: self.elapsed.as_secs(),
            next_chunk_index: self.next_chunk_index,
            chunks_queued: self.chunks_queued,
            chunks_uploaded: uploads.uploaded,
            chunks_failed: uploads.failed,
            uploads_pending: uploads.pending,
            device: self
                .source
                .as_ref()
                .filter(|s| s.is_acquired())
                .map(|s| s.name().to_string()),
        }
    }

    pub fn publish_stats(&self) {
        // Snapshot under the watch lock so the upload worker never overwrites newer counts
        self.stats.send_modify(|stats| *stats = self.snapshot());
    }

    /// Report a segment that could not be finalized
    pub fn encoder_failed(&self, err: &CaptureError) {
        error!("Segment flush failed for {}: {}", self.recording_id, err);
        self.emit(PipelineEvent::EncoderFailed {
            error: err.to_string(),
        });
    }

    /// Whether timers armed with `epoch` may still act on this state
    pub fn timers_armed(&self, epoch: u64) -> bool {
        self.timer_epoch == Some(epoch) && self.phase == Phase::Recording
    }

    /// Cancel the rotator and ticker; synchronous with the caller's transition
    pub fn stop_timers(&mut self) {
        self.timer_epoch = None;
        if let Some(rotator) = self.rotator.take() {
            rotator.cancel();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    /// Tag a finalized segment with the next index and queue it for upload
    ///
    /// Empty segments consume no index.
    pub fn submit_segment(&mut self, segment: Segment) {
        if segment.is_empty() {
            debug!("Skipping empty segment for {}", self.recording_id);
            return;
        }

        let chunk = AudioChunk {
            recording_id: self.recording_id.clone(),
            chunk_index: self.next_chunk_index,
            duration_seconds: segment.duration.as_secs_f64(),
            payload: segment.payload,
        };
        self.next_chunk_index += 1;
        self.chunks_queued += 1;

        info!(
            "Chunk {} queued: {:.1}s ({} bytes)",
            chunk.chunk_index,
            chunk.duration_seconds,
            chunk.payload.len()
        );
        self.emit(PipelineEvent::ChunkQueued {
            chunk_index: chunk.chunk_index,
            duration_seconds: chunk.duration_seconds,
        });

        self.uploader.enqueue(chunk);
        self.publish_stats();
    }

    /// Close the active encoder and queue its last segment
    pub fn final_flush(&mut self) -> Result<(), CaptureError> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };

        match encoder.close() {
            Ok(Some(segment)) => {
                self.submit_segment(segment);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.encoder_failed(&e);
                Err(e)
            }
        }
    }

    /// Stop timers, flush, wait for queued uploads and release the device
    pub async fn shutdown_capture(&mut self) -> Result<(), CaptureError> {
        self.stop_timers();
        let flushed = self.final_flush();

        self.uploader.drain().await;

        if let Some(mut source) = self.source.take() {
            source.release().await;
        }
        self.publish_stats();

        flushed
    }

    pub fn tick(&mut self, period: Duration) {
        self.elapsed += period;
        self.emit(PipelineEvent::Elapsed {
            seconds: self.elapsed.as_secs(),
        });
        self.publish_stats();
    }
}

impl Drop for CaptureState {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::Recording | Phase::Paused) {
            warn!(
                "Capture for {} torn down while {}; cancelling timers and releasing device",
                self.recording_id, self.phase
            );
        }
        self.stop_timers();
    }
}
