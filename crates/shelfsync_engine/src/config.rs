//! Configuration for the reconciliation engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of due items fetched per push batch.
    pub push_batch_size: usize,
    /// Transient failures tolerated before an item is marked failed.
    pub max_retries: u32,
    /// Upper bound on every external call.
    pub request_timeout: Duration,
    /// How long a worker owns a `processing` item.
    pub lease_duration: Duration,
    /// How long completed items are kept before purging.
    pub completed_retention: Duration,
    /// Interval of the periodic scheduler; `None` disables it.
    pub sync_interval: Option<Duration>,
    /// Backoff configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            push_batch_size: 50,
            max_retries: 5,
            request_timeout: Duration::from_secs(30),
            lease_duration: Duration::from_secs(120),
            completed_retention: Duration::from_secs(7 * 24 * 60 * 60),
            sync_interval: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }

    /// Sets the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the lease duration.
    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    /// Sets the retention of completed items.
    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Sets the interval for the periodic scheduler.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Lease granted per item. Never shorter than the request timeout, so a
    /// bounded call always finishes inside its lease.
    pub fn lease_window(&self) -> Duration {
        self.lease_duration.max(self.request_timeout)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff for rescheduled queue items.
///
/// The delay after the `n`th failed attempt is `base_delay * multiplier^n`,
/// capped at `max_delay`. There is no jitter: successive delays never shrink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay unit.
    pub base_delay: Duration,
    /// Maximum delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: u32,
}

impl RetryConfig {
    /// Creates a configuration with the given base delay.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: Duration::from_secs(15 * 60),
            multiplier: 2,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Delay before the attempt that follows `retry_count` failures.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        self.multiplier
            .checked_pow(retry_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
