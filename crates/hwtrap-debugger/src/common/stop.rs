use std::time::Duration;

/// Policy for stopping a running thread.
///
/// A stop is requested up to `max_attempts` times. After the `n`-th request,
/// the thread is given `initial_wait * 2^n` (at most `max_wait`) to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of stop requests.
    pub max_attempts: u32,

    /// Time given to the thread to stop after the first request.
    pub initial_wait: Duration,

    /// Maximum time given to the thread to stop after any request.
    pub max_wait: Duration,
}

impl RetryPolicy {
    /// Returns how long to wait after the given (0-based) attempt.
    pub fn wait_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_wait.saturating_mul(factor).min(self.max_wait)
    }

    /// Returns the longest time the whole policy can take.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts)
            .map(|attempt| self.wait_for_attempt(attempt))
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_wait: Duration::from_millis(10),
            max_wait: Duration::from_millis(100),
        }
    }
}

/// State of a [StopRequest].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopState {
    /// A stop must be requested.
    Requesting,

    /// A stop was requested, the thread has the given time to stop.
    Waiting {
        /// Time given to the thread.
        wait: Duration,
    },

    /// The thread is stopped.
    Stopped,

    /// Every attempt timed out.
    GaveUp,
}

/// Bounded-retry state machine for stopping a single thread.
///
/// ```
/// use std::time::Duration;
///
/// use hwtrap_debugger::{RetryPolicy, StopRequest, StopState};
///
/// let policy = RetryPolicy {
///     max_attempts: 2,
///     initial_wait: Duration::from_millis(10),
///     max_wait: Duration::from_millis(100),
/// };
///
/// let mut request = StopRequest::new(policy);
/// assert_eq!(request.state(), StopState::Requesting);
///
/// request.requested();
/// request.timed_out();
/// request.requested();
/// assert_eq!(
///     request.state(),
///     StopState::Waiting { wait: Duration::from_millis(20) }
/// );
///
/// request.timed_out();
/// assert_eq!(request.state(), StopState::GaveUp);
/// ```
#[derive(Clone, Debug)]
pub struct StopRequest {
    policy: RetryPolicy,
    attempt: u32,
    state: StopState,
}

impl StopRequest {
    /// Creates a new request.
    pub const fn new(policy: RetryPolicy) -> Self {
        let state = if policy.max_attempts == 0 {
            StopState::GaveUp
        } else {
            StopState::Requesting
        };

        Self {
            policy,
            attempt: 0,
            state,
        }
    }

    /// Returns the current state.
    pub const fn state(&self) -> StopState {
        self.state
    }

    /// Returns the number of attempts that timed out.
    pub const fn failed_attempts(&self) -> u32 {
        self.attempt
    }

    /// Records that a stop was requested.
    pub fn requested(&mut self) {
        if self.state == StopState::Requesting {
            self.state = StopState::Waiting {
                wait: self.policy.wait_for_attempt(self.attempt),
            };
        }
    }

    /// Records that the thread didn't stop in time.
    pub fn timed_out(&mut self) {
        if let StopState::Waiting { .. } = self.state {
            self.attempt += 1;

            self.state = if self.attempt >= self.policy.max_attempts {
                StopState::GaveUp
            } else {
                StopState::Requesting
            };
        }
    }

    /// Records that the thread stopped.
    pub fn stopped(&mut self) {
        if matches!(self.state, StopState::Requesting | StopState::Waiting { .. }) {
            self.state = StopState::Stopped;
        }
    }
}
