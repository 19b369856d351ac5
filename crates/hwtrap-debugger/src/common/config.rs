use std::time::Duration;

use super::stop::RetryPolicy;
use super::waiter::PollPolicy;

/// Configuration of a [Tracer](crate::Tracer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TracerConfig {
    /// Policy for stopping a running thread before touching its debug
    /// registers.
    pub stop_retry: RetryPolicy,

    /// Polling policy while waiting for debug events.
    pub poll: PollPolicy,

    /// Maximum time to wait for a freshly attached thread to stop.
    pub attach_timeout: Duration,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            stop_retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
            attach_timeout: Duration::from_secs(5),
        }
    }
}
