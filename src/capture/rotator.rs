//! Periodic timers driving a recording: the chunk rotator and the elapsed-time ticker
//!
//! Both run as tasks that take the capture lock on every tick and act only if
//! the epoch they were armed with is still current and the phase is
//! `Recording`. Cancelling a timer clears the epoch under the same lock as the
//! phase change, so a tick that was already due when the transition happened
//! finds itself disarmed and exits without touching the encoder.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::state::{CaptureState, WeakState};

/// Handle to a periodic capture timer; aborts the task when cancelled or dropped
pub(crate) struct TimerHandle {
    label: &'static str,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(self) {
        debug!("{} cancelled", self.label);
        // Drop aborts the task
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_periodic<F>(
    label: &'static str,
    state: WeakState,
    epoch: u64,
    period: Duration,
    mut on_tick: F,
) -> TimerHandle
where
    F: FnMut(&mut CaptureState) + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(state) = state.upgrade() else {
                break;
            };
            let mut guard = state.lock().await;

            match guard.as_mut() {
                Some(capture) if capture.timers_armed(epoch) => on_tick(capture),
                _ => {
                    debug!("{} fired after cancellation; ignoring", label);
                    break;
                }
            }
        }
    });

    TimerHandle { label, task }
}

/// Chunk rotator: forces a segment flush every `interval` while recording
pub(crate) struct ChunkRotator;

impl ChunkRotator {
    pub fn start(state: WeakState, epoch: u64, interval: Duration) -> TimerHandle {
        debug!("Chunk rotator armed ({:?})", interval);
        spawn_periodic("chunk rotator", state, epoch, interval, rotate)
    }
}

/// One rotation: finalize the current segment and queue it under the next index
///
/// The encoder keeps a fresh buffer bound to the same input stream, so audio
/// captured across the boundary lands in the next segment.
pub(crate) fn rotate(capture: &mut CaptureState) {
    let Some(encoder) = capture.encoder.as_mut() else {
        error!("Rotation for {} found no active encoder", capture.recording_id);
        return;
    };

    match encoder.flush() {
        Ok(segment) => capture.submit_segment(segment),
        Err(e) => capture.encoder_failed(&e),
    }
}

/// Elapsed-time ticker for display
pub(crate) struct ElapsedTicker;

impl ElapsedTicker {
    pub fn start(state: WeakState, epoch: u64, period: Duration) -> TimerHandle {
        spawn_periodic("elapsed ticker", state, epoch, period, move |capture| {
            capture.tick(period)
        })
    }
}
