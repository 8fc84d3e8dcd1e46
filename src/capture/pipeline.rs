use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, warn};

use super::config::CaptureConfig;
use super::rotator::{ChunkRotator, ElapsedTicker};
use super::state::{CaptureState, Phase, PipelineEvent, SharedState};
use super::stats::CaptureStats;
use super::uploader::Uploader;
use crate::audio::AudioSourceFactory;
use crate::error::{CaptureError, StoreError};
use crate::store::{RecordingSession, SessionStore};

/// Invoked after every successful session lifecycle call
pub type RecordingCallback = Arc<dyn Fn(&RecordingSession) + Send + Sync>;

struct Shared {
    store: Arc<dyn SessionStore>,
    sources: Arc<dyn AudioSourceFactory>,
    config: CaptureConfig,
    /// Latest known snapshot of the attached session
    recording: Arc<watch::Sender<Option<RecordingSession>>>,
    events: broadcast::Sender<PipelineEvent>,
    /// Status readable without waiting on an in-flight intent
    stats: Arc<watch::Sender<CaptureStats>>,
    /// Next chunk index issued per recording; survives detach
    issued: StdMutex<HashMap<String, u32>>,
    timer_epochs: AtomicU64,
    on_update: StdMutex<Option<RecordingCallback>>,
}

/// Capture pipeline: the session state machine driving device, rotation and uploads
///
/// Every intent runs under one lock, so phase transitions are linearized:
/// an intent arriving while another is suspended (device acquisition, upload
/// drain, lifecycle call) waits for it to settle.
#[derive(Clone)]
pub struct CapturePipeline {
    state: SharedState,
    shared: Arc<Shared>,
}

fn lifecycle(operation: &'static str) -> impl FnOnce(StoreError) -> CaptureError {
    move |source| CaptureError::LifecycleCallFailed { operation, source }
}

impl CapturePipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        sources: Arc<dyn AudioSourceFactory>,
        config: CaptureConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (recording, _) = watch::channel(None);
        let (stats, _) = watch::channel(CaptureStats::detached());

        info!(
            "Capture pipeline initialized (rotation every {:?}, {} upload attempt(s))",
            config.rotation_interval, config.upload.max_attempts
        );

        Self {
            state: Arc::new(Mutex::new(None)),
            shared: Arc::new(Shared {
                store,
                sources,
                config,
                recording: Arc::new(recording),
                events,
                stats: Arc::new(stats),
                issued: StdMutex::new(HashMap::new()),
                timer_epochs: AtomicU64::new(0),
                on_update: StdMutex::new(None),
            }),
        }
    }

    /// Register the recording-update callback
    pub fn on_recording_update<F>(&self, callback: F)
    where
        F: Fn(&RecordingSession) + Send + Sync + 'static,
    {
        let mut slot = self.shared.on_update.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(callback));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Latest known snapshot of the attached session
    pub fn recording(&self) -> Option<RecordingSession> {
        self.shared.recording.borrow().clone()
    }

    pub fn watch_recording(&self) -> watch::Receiver<Option<RecordingSession>> {
        self.shared.recording.subscribe()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.shared.config
    }

    /// Current phase; never waits on an in-flight intent
    pub fn phase(&self) -> Phase {
        self.shared.stats.borrow().phase
    }

    /// Status snapshot as of the last state change
    pub fn stats(&self) -> CaptureStats {
        self.shared.stats.borrow().clone()
    }

    pub fn watch_stats(&self) -> watch::Receiver<CaptureStats> {
        self.shared.stats.subscribe()
    }

    // ------------------------------------------------------------------
    // Session attachment
    // ------------------------------------------------------------------

    /// Create a new session on the store and attach it
    ///
    /// A recording or paused session is finished first. If that finish fails
    /// nothing is created and the previous session stays attached in `Ending`.
    pub async fn create_and_attach(&self) -> Result<RecordingSession, CaptureError> {
        let mut guard = self.state.lock().await;
        self.finish_attached(&mut guard).await?;

        let session = self
            .shared
            .store
            .create_session()
            .await
            .map_err(|e| self.report_lifecycle_failure(lifecycle("create")(e)))?;

        self.install_locked(&mut guard, &session);
        self.publish(&session);

        Ok(session)
    }

    /// Attach an existing session by id
    ///
    /// Fails without attaching if the current session cannot be finished.
    pub async fn attach_by_id(&self, id: &str) -> Result<RecordingSession, CaptureError> {
        let mut guard = self.state.lock().await;

        let session = self
            .shared
            .store
            .read_session(id)
            .await
            .map_err(|e| self.report_lifecycle_failure(lifecycle("read")(e)))?;

        self.finish_attached(&mut guard).await?;
        self.install_locked(&mut guard, &session);
        self.publish(&session);

        Ok(session)
    }

    /// Attach a session snapshot obtained elsewhere
    pub async fn attach(&self, session: RecordingSession) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        self.finish_attached(&mut guard).await?;
        self.install_locked(&mut guard, &session);
        self.shared.recording.send_replace(Some(session));
        Ok(())
    }

    /// Detach the current session, tearing down capture first if needed
    ///
    /// The session is detached even if the teardown's finish call fails; that
    /// failure is returned.
    pub async fn detach(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let result = self.finish_attached(&mut guard).await;
        self.clear_locked(&mut guard);
        self.shared.recording.send_replace(None);
        result
    }

    /// Replace whatever is attached with a fresh state for `session`
    fn install_locked(&self, slot: &mut Option<CaptureState>, session: &RecordingSession) {
        self.clear_locked(slot);

        // The server only counts accepted chunks, so a failed upload would
        // otherwise hand its index out again on re-attach
        let issued = self
            .shared
            .issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session.id)
            .copied()
            .unwrap_or(0);
        let next_chunk_index = session.chunk_count.max(issued);

        let uploader = Uploader::spawn(
            Arc::clone(&self.shared.store),
            self.shared.config.upload.clone(),
            Arc::clone(&self.shared.recording),
            Arc::clone(&self.shared.stats),
            self.shared.events.clone(),
        );
        let capture = CaptureState::new(
            session,
            next_chunk_index,
            uploader,
            self.shared.events.clone(),
            Arc::clone(&self.shared.stats),
        );

        info!(
            "Attached recording {} (status {}, next chunk {})",
            session.id, session.status, capture.next_chunk_index
        );
        capture.emit(PipelineEvent::PhaseChanged {
            recording_id: session.id.clone(),
            phase: capture.phase,
        });
        capture.publish_stats();

        *slot = Some(capture);
    }

    /// Finish the attached session if it is still capturing
    async fn finish_attached(&self, slot: &mut Option<CaptureState>) -> Result<(), CaptureError> {
        match slot.as_mut() {
            Some(capture) if matches!(capture.phase, Phase::Recording | Phase::Paused) => {
                info!("Detaching {} while {}; finishing first", capture.recording_id, capture.phase);
                self.finish_locked(capture).await
            }
            _ => Ok(()),
        }
    }

    fn clear_locked(&self, slot: &mut Option<CaptureState>) {
        let Some(capture) = slot.take() else {
            return;
        };
        if capture.phase == Phase::Ending {
            warn!("Detaching {} before its finish call succeeded", capture.recording_id);
        }

        self.shared
            .issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capture.recording_id.clone(), capture.next_chunk_index);
        capture.emit(PipelineEvent::Detached {
            recording_id: capture.recording_id.clone(),
        });
        self.shared.stats.send_replace(CaptureStats::detached());
        info!("Detached recording {}", capture.recording_id);
    }

    // ------------------------------------------------------------------
    // Capture intents
    // ------------------------------------------------------------------

    /// Idle -> Recording
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        match capture.phase {
            Phase::Idle => {}
            Phase::Recording => {
                warn!("Recording already started");
                return Ok(());
            }
            from => return Err(CaptureError::InvalidTransition { from, intent: "start" }),
        }

        if capture.source.is_none() {
            capture.source = Some(self.shared.sources.create()?);
        }
        let Some(source) = capture.source.as_mut() else {
            return Err(CaptureError::DeviceUnavailable("no input source".to_string()));
        };

        if let Err(e) = source.acquire().await {
            error!("Failed to start recording {}: {}", capture.recording_id, e);
            capture.source = None;
            return Err(e);
        }

        let encoder = match source.open_encoder() {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("Failed to open encoder for {}: {}", capture.recording_id, e);
                source.release().await;
                capture.source = None;
                return Err(e);
            }
        };

        capture.encoder = Some(encoder);
        capture.elapsed = Default::default();
        capture.set_phase(Phase::Recording);
        self.arm_timers(capture);

        Ok(())
    }

    /// Recording -> Paused
    ///
    /// The last partial segment is queued and the queue drained before the
    /// pause call, so the store never sees a chunk for a paused session. If
    /// the call fails the capture stays paused locally and the error is
    /// returned; `refresh` re-reads the server status.
    pub async fn pause(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        match capture.phase {
            Phase::Recording => {}
            Phase::Paused => {
                warn!("Recording already paused");
                return Ok(());
            }
            from => return Err(CaptureError::InvalidTransition { from, intent: "pause" }),
        }

        capture.stop_timers();
        let flushed = capture.final_flush();
        capture.set_phase(Phase::Paused);
        capture.uploader.drain().await;

        let session = match self.shared.store.pause_session(&capture.recording_id).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(lost) = &flushed {
                    warn!("Pause call failed after a lost final segment: {}", lost);
                }
                return Err(self.report_lifecycle_failure(lifecycle("pause")(e)));
            }
        };
        self.publish(&session);

        flushed
    }

    /// Paused -> Recording, on the retained input stream
    pub async fn resume(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        match capture.phase {
            Phase::Paused => {}
            Phase::Recording => {
                warn!("Recording already active");
                return Ok(());
            }
            from => return Err(CaptureError::InvalidTransition { from, intent: "resume" }),
        }

        let source = capture
            .source
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable("input device was released".to_string()))?;
        let encoder = source.open_encoder()?;

        capture.encoder = Some(encoder);
        capture.set_phase(Phase::Recording);
        self.arm_timers(capture);

        Ok(())
    }

    /// Recording/Paused -> Ending -> Ended
    ///
    /// A no-op once finishing has begun. If the finish call fails the capture
    /// is already torn down and stays `Ending`; use `retry_finish`.
    pub async fn finish(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        match capture.phase {
            Phase::Recording | Phase::Paused => self.finish_locked(capture).await,
            Phase::Ending | Phase::Ended => {
                info!("Recording {} already {}", capture.recording_id, capture.phase);
                Ok(())
            }
            from => Err(CaptureError::InvalidTransition { from, intent: "finish" }),
        }
    }

    /// Re-issue a failed finish call
    pub async fn retry_finish(&self) -> Result<(), CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        match capture.phase {
            Phase::Ending => self.issue_finish(capture).await,
            Phase::Ended => Ok(()),
            from => Err(CaptureError::InvalidTransition { from, intent: "retry finish" }),
        }
    }

    async fn finish_locked(&self, capture: &mut CaptureState) -> Result<(), CaptureError> {
        capture.set_phase(Phase::Ending);
        let flushed = capture.shutdown_capture().await;

        if let Err(e) = self.issue_finish(capture).await {
            if let Err(lost) = &flushed {
                warn!("Finish call failed after a lost final segment: {}", lost);
            }
            return Err(e);
        }
        flushed
    }

    async fn issue_finish(&self, capture: &mut CaptureState) -> Result<(), CaptureError> {
        let session = self
            .shared
            .store
            .finish_session(&capture.recording_id)
            .await
            .map_err(|e| self.report_lifecycle_failure(lifecycle("finish")(e)))?;

        capture.set_phase(Phase::Ended);
        info!("Recording {} finished; transcription requested", session.id);
        self.publish(&session);

        Ok(())
    }

    // ------------------------------------------------------------------
    // Session reads and metadata
    // ------------------------------------------------------------------

    /// Re-read the attached session and reconcile the local phase
    pub async fn refresh(&self) -> Result<RecordingSession, CaptureError> {
        let mut guard = self.state.lock().await;
        let capture = guard.as_mut().ok_or(CaptureError::NoSession)?;

        let session = self
            .shared
            .store
            .read_session(&capture.recording_id)
            .await
            .map_err(|e| self.report_lifecycle_failure(lifecycle("read")(e)))?;

        if session.is_ended() {
            match capture.phase {
                Phase::Recording | Phase::Paused => {
                    warn!(
                        "Recording {} ended on the server while {}; stopping capture",
                        capture.recording_id, capture.phase
                    );
                    capture.set_phase(Phase::Ending);
                    if let Err(e) = capture.shutdown_capture().await {
                        warn!("Final flush failed: {}", e);
                    }
                    capture.set_phase(Phase::Ended);
                }
                Phase::Idle | Phase::Ending => capture.set_phase(Phase::Ended),
                Phase::Ended => {}
            }
        }

        self.publish(&session);
        Ok(session)
    }

    /// Update the notes of the attached session
    pub async fn update_notes(&self, notes: &str) -> Result<RecordingSession, CaptureError> {
        let guard = self.state.lock().await;
        let capture = guard.as_ref().ok_or(CaptureError::NoSession)?;

        let session = self
            .shared
            .store
            .update_notes(&capture.recording_id, notes)
            .await
            .map_err(|e| self.report_lifecycle_failure(lifecycle("notes")(e)))?;
        self.publish(&session);

        Ok(session)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn arm_timers(&self, capture: &mut CaptureState) {
        let epoch = self.shared.timer_epochs.fetch_add(1, Ordering::SeqCst);
        let state = Arc::downgrade(&self.state);

        capture.timer_epoch = Some(epoch);
        capture.rotator = Some(ChunkRotator::start(
            state.clone(),
            epoch,
            self.shared.config.rotation_interval,
        ));
        capture.ticker = Some(ElapsedTicker::start(state, epoch, self.shared.config.tick_interval));
    }

    /// Refresh the mirror and notify observers after a successful lifecycle call
    fn publish(&self, session: &RecordingSession) {
        self.shared.recording.send_replace(Some(session.clone()));
        let _ = self
            .shared
            .events
            .send(PipelineEvent::RecordingUpdated(session.clone()));

        let callback = self
            .shared
            .on_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(session);
        }
    }

    fn report_lifecycle_failure(&self, err: CaptureError) -> CaptureError {
        error!("{}", err);
        if let CaptureError::LifecycleCallFailed { operation, .. } = &err {
            let _ = self.shared.events.send(PipelineEvent::LifecycleFailed {
                operation: *operation,
                error: err.to_string(),
            });
        }
        err
    }
}
