//! Configuration for the sync engine.

use std::time::Duration;

/// Default number of local ids per remote query for refresh targets.
///
/// Keeps `Id IN (...)` queries under the remote query-length limit.
pub const DEFAULT_REFRESH_BATCH_SIZE: usize = 500;

/// Default page size when iterating over local records.
pub const DEFAULT_STORE_PAGE_SIZE: usize = 2000;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size used when paging through a local collection
    /// (dirty records, ghost cleanup).
    pub store_page_size: usize,
    /// Default batch size for refresh targets that do not set their own.
    pub refresh_batch_size: usize,
    /// Capacity of the progress event channel.
    pub event_capacity: usize,
    /// Retry configuration for runs failing with a retryable error.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration with default values.
    pub fn new() -> Self {
        Self {
            store_page_size: DEFAULT_STORE_PAGE_SIZE,
            refresh_batch_size: DEFAULT_REFRESH_BATCH_SIZE,
            event_capacity: 256,
            retry: RetryConfig::no_retry(),
        }
    }

    /// Sets the local store page size.
    pub fn with_store_page_size(mut self, size: usize) -> Self {
        self.store_page_size = size.max(1);
        self
    }

    /// Sets the default refresh batch size.
    pub fn with_refresh_batch_size(mut self, size: usize) -> Self {
        self.refresh_batch_size = size.max(1);
        self
    }

    /// Sets the progress event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // up to 25% on top
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
