use std::time::Duration;

/// Configuration for a capture pipeline
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Interval between forced segment rotations while recording
    /// Default: 30 seconds
    pub rotation_interval: Duration,

    /// Elapsed-time display tick
    pub tick_interval: Duration,

    /// Delivery policy for chunk uploads
    pub upload: UploadPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            upload: UploadPolicy::default(),
        }
    }
}

/// How the uploader treats failed chunk uploads
///
/// The default makes a single attempt with no timeout: a failed chunk is
/// reported and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    /// Total attempts per chunk (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay
    pub max_backoff: Duration,
    /// Bound on a single upload attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: None,
        }
    }
}

impl UploadPolicy {
    /// Retry with exponential backoff
    pub fn with_retries(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
