use super::registers::{BreakpointRegister, Registers};
use super::target::{ExitStatus, Signal};

/// Caller's verdict on the signal that stopped a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContinueDecision {
    /// The signal is suppressed.
    Handled,

    /// The signal is delivered to the thread.
    NotHandled,
}

/// Information about a hardware breakpoint trap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// The slot which fired.
    pub caused_by: BreakpointRegister,

    /// Register state of the thread at the time of the trap.
    pub registers: Registers,
}

/// A thread stopped on a hardware breakpoint.
///
/// The thread stays stopped until the event is handed back to
/// [Tracer::handle_event](crate::Tracer::handle_event), which consumes it.
#[derive(Debug)]
pub struct DebugEvent {
    thread_id: u64,
    exception: ExceptionInfo,
}

impl DebugEvent {
    pub(crate) const fn new(thread_id: u64, exception: ExceptionInfo) -> Self {
        Self {
            thread_id,
            exception,
        }
    }

    /// Returns the ID of the thread which trapped.
    pub const fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Returns the trap information.
    pub const fn exception(&self) -> &ExceptionInfo {
        &self.exception
    }
}

/// Result of waiting for a debug event.
#[derive(Debug)]
pub enum AwaitOutcome {
    /// A thread stopped on a hardware breakpoint.
    Breakpoint(DebugEvent),

    /// Nothing happened before the timeout.
    TimedOut,

    /// A thread stopped for another reason, and was resumed with its signal.
    Forwarded {
        /// ID of the resumed thread.
        thread_id: u64,

        /// Signal the thread stopped with.
        signal: Signal,
    },

    /// A thread of the process terminated.
    ThreadExited {
        /// ID of the terminated thread.
        thread_id: u64,

        /// Exit status of the thread.
        status: ExitStatus,
    },

    /// The process terminated.
    ProcessExited(ExitStatus),
}
