use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{error, info, warn};

use super::config::UploadPolicy;
use super::state::PipelineEvent;
use super::stats::CaptureStats;
use crate::error::{CaptureError, StoreError};
use crate::store::{AudioChunk, ChunkReceipt, RecordingSession, SessionStore};

enum UploadJob {
    Chunk(AudioChunk),
    /// Acknowledged once every job queued before it has settled
    Drain(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct UploadCounters {
    uploaded: AtomicU32,
    failed: AtomicU32,
    pending: AtomicU32,
}

impl UploadCounters {
    fn snapshot(&self) -> UploadStats {
        UploadStats {
            uploaded: self.uploaded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of uploader progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: u32,
    pub failed: u32,
    pub pending: u32,
}

/// FIFO chunk uploader for one recording
///
/// A single worker task drains the queue, so the next upload starts only
/// after the previous one has succeeded or been abandoned.
pub struct Uploader {
    tx: mpsc::UnboundedSender<UploadJob>,
    counters: Arc<UploadCounters>,
}

impl Uploader {
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        policy: UploadPolicy,
        recording: Arc<watch::Sender<Option<RecordingSession>>>,
        stats: Arc<watch::Sender<CaptureStats>>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(UploadCounters::default());

        let worker = UploadWorker {
            store,
            policy,
            recording,
            stats,
            events,
            counters: Arc::clone(&counters),
        };
        tokio::spawn(worker.run(rx));

        Self { tx, counters }
    }

    /// Queue a chunk for upload; never waits
    pub fn enqueue(&self, chunk: AudioChunk) {
        let index = chunk.chunk_index;
        self.counters.pending.fetch_add(1, Ordering::SeqCst);

        if self.tx.send(UploadJob::Chunk(chunk)).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            error!("Upload worker gone; chunk {} dropped", index);
        }
    }

    /// Wait until every chunk queued so far has been uploaded or abandoned
    pub async fn drain(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(UploadJob::Drain(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.counters.snapshot()
    }
}

struct UploadWorker {
    store: Arc<dyn SessionStore>,
    policy: UploadPolicy,
    recording: Arc<watch::Sender<Option<RecordingSession>>>,
    stats: Arc<watch::Sender<CaptureStats>>,
    events: broadcast::Sender<PipelineEvent>,
    counters: Arc<UploadCounters>,
}

impl UploadWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<UploadJob>) {
        while let Some(job) = rx.recv().await {
            match job {
                UploadJob::Chunk(chunk) => self.deliver(chunk).await,
                UploadJob::Drain(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn deliver(&self, chunk: AudioChunk) {
        let index = chunk.chunk_index;
        let mut attempt = 1;

        let outcome = loop {
            match self.attempt(&chunk).await {
                Ok(receipt) => break Ok(receipt),
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "Chunk {} upload attempt {}/{} failed: {}. Retrying in {:?}",
                        index, attempt, self.policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        match &outcome {
            Ok(_) => self.counters.uploaded.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.counters.failed.fetch_add(1, Ordering::SeqCst),
        };
        self.publish_counts(&chunk.recording_id);

        match outcome {
            Ok(receipt) => {
                self.recording.send_modify(|recording| {
                    if let Some(recording) = recording.as_mut() {
                        if recording.id == chunk.recording_id {
                            recording.chunk_count += 1;
                        }
                    }
                });

                info!(
                    "Uploaded chunk {} of {} ({} bytes)",
                    index,
                    chunk.recording_id,
                    receipt.file_size.unwrap_or(chunk.payload.len() as u64)
                );
                let _ = self.events.send(PipelineEvent::ChunkUploaded { chunk_index: index });
            }
            Err(source) => {
                let err = CaptureError::UploadFailed {
                    chunk_index: index,
                    source,
                };
                error!("{}; chunk dropped", err);
                let _ = self.events.send(PipelineEvent::ChunkFailed {
                    chunk_index: index,
                    error: err.to_string(),
                });
            }
        }
    }

    fn publish_counts(&self, recording_id: &str) {
        self.stats.send_if_modified(|stats| {
            if stats.recording_id.as_deref() != Some(recording_id) {
                return false;
            }
            let counts = self.counters.snapshot();
            stats.chunks_uploaded = counts.uploaded;
            stats.chunks_failed = counts.failed;
            stats.uploads_pending = counts.pending;
            true
        });
    }

    async fn attempt(&self, chunk: &AudioChunk) -> Result<ChunkReceipt, StoreError> {
        match self.policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.upload_chunk(chunk))
                .await
                .unwrap_or_else(|_| Err(StoreError::Timeout(limit))),
            None => self.store.upload_chunk(chunk).await,
        }
    }
}
