//! Configuration types for the capture-stream crate

use std::time::Duration;

/// Configuration for [`PollScheduler`](crate::PollScheduler)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Only report a sampled value when it differs from the previous sample.
    /// Can be overridden per field.
    /// Default: false
    pub event_only_on_change: bool,

    /// Delay the next read of a failing field by `min(k², 3600)` seconds,
    /// rounded to the field's period, where k is the consecutive failure count.
    /// Default: true
    pub failure_backoff: bool,

    /// How long `stop` waits for the worker before detaching it.
    /// Default: 3 seconds
    pub shutdown_grace: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            event_only_on_change: false,
            failure_backoff: true,
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report only changed values
    pub fn change_only() -> Self {
        Self {
            event_only_on_change: true,
            ..Self::default()
        }
    }

    /// Keep polling failing fields at their normal period
    pub fn without_backoff(mut self) -> Self {
        self.failure_backoff = false;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Configuration for event streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Maximum number of undelivered events per stream. One more evicts the
    /// consumer.
    /// Default: 200
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 200,
        }
    }
}

impl StreamConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}
