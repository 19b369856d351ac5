use std::time::{Duration, Instant};

use super::target::{TargetControl, TargetError, WaitEvent};

/// Polling policy of a timed wait.
///
/// State changes are polled without blocking, sleeping between polls. The
/// sleep interval starts at `initial_interval` and doubles up to
/// `max_interval`, but never exceeds the time left before the deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// First sleep interval.
    pub initial_interval: Duration,

    /// Maximum sleep interval.
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_micros(500),
            max_interval: Duration::from_millis(10),
        }
    }
}

/// Point in time after which a wait gives up.
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Instant);

impl Deadline {
    /// Returns the deadline `timeout` from now.
    ///
    /// Timeouts too large to be represented are capped to a year.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(now.checked_add(timeout).unwrap_or(now + Duration::from_secs(86400 * 365)))
    }

    /// Returns the time left, or `None` if the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }
}

/// Waits for state changes of traced threads, with a deadline.
///
/// Nothing is armed while waiting: once the deadline passes, the traced
/// threads are exactly as they were before the call.
pub struct TimedWaiter {
    policy: PollPolicy,
}

impl TimedWaiter {
    /// Creates a waiter following the given polling policy.
    pub const fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Returns the next state change, or `None` if the deadline passed first.
    ///
    /// A state change reaped from the target is always returned, even if the
    /// deadline passed in the meantime.
    pub fn wait<T: TargetControl>(
        &self,
        target: &mut T,
        thread_id: Option<u64>,
        deadline: Deadline,
    ) -> Result<Option<WaitEvent>, TargetError> {
        let mut interval = self.policy.initial_interval;

        loop {
            if let Some(event) = target.try_wait(thread_id)? {
                return Ok(Some(event));
            }

            let Some(remaining) = deadline.remaining() else {
                return Ok(None);
            };

            std::thread::sleep(interval.min(remaining));

            interval = interval.saturating_mul(2).min(self.policy.max_interval);
        }
    }
}
