use crate::common::target::TargetError;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The process (or its primary thread) could not be traced.
    #[error("failed to attach to process {process_id}: {source}")]
    Attach {
        /// ID of the process to attach to.
        process_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// A thread didn't report its initial stop after being attached.
    #[error("thread {thread_id} did not stop after attaching")]
    AttachTimeout {
        /// ID of the unresponsive thread.
        thread_id: u64,
    },

    /// Some threads could not be cleanly detached.
    ///
    /// Every other thread of the process was detached.
    #[error("failed to detach from process {process_id}: {}", join(.failures))]
    Detach {
        /// ID of the process.
        process_id: u64,

        /// Failure of each thread.
        failures: Vec<Error>,
    },

    /// A thread could not stop being traced.
    #[error("failed to untrace thread {thread_id}: {source}")]
    Untrace {
        /// ID of the thread that is still traced.
        thread_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// The debug status register or the general-purpose registers of a
    /// trapping thread could not be read.
    ///
    /// The thread was resumed with its original signal.
    #[error("failed to read registers of thread {thread_id}: {source}")]
    RegisterRead {
        /// ID of the trapping thread.
        thread_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// The debug registers of a thread could not be read or written while
    /// programming or clearing its hardware breakpoints.
    #[error("failed to access debug registers of thread {thread_id}: {source}")]
    DebugRegisters {
        /// ID of the thread.
        thread_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// A stopped thread could not be resumed.
    #[error("failed to resume thread {thread_id}: {source}")]
    Resume {
        /// ID of the stopped thread.
        thread_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// A stop could not be requested for a thread.
    #[error("failed to stop thread {thread_id}: {source}")]
    Stop {
        /// ID of the thread.
        thread_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// Some threads didn't stop in time, so their debug registers were left
    /// untouched.
    ///
    /// Every other thread of the process was programmed.
    #[error("threads {thread_ids:?} did not stop in time")]
    ThreadStopTimeout {
        /// IDs of the threads which were skipped.
        thread_ids: Vec<u64>,
    },

    /// Some threads could not be programmed.
    ///
    /// Every other thread of the process was programmed.
    #[error("failed to program hardware breakpoint: {}", join(.failures))]
    Program {
        /// Failure of each thread.
        failures: Vec<Error>,
    },

    /// The invalid breakpoint register was given as a programming target.
    #[error("invalid hardware breakpoint register")]
    InvalidSlot,

    /// The threads of the process could not be listed.
    #[error("failed to list threads of process {process_id}: {source}")]
    ThreadList {
        /// ID of the process.
        process_id: u64,

        /// Underlying OS error.
        #[source]
        source: TargetError,
    },

    /// Waiting for a debug event failed.
    #[error("failed to wait for debug events: {0}")]
    Wait(#[source] TargetError),

    /// The given thread is not traced by this tracer.
    #[error("thread {0} is not traced")]
    UnknownThread(u64),

    /// The tracer is no longer attached to any thread.
    #[error("no traced thread left")]
    NoTracedThreads,
}

impl Error {
    /// Returns whether the error leaves the tracer in an unusable state.
    ///
    /// Non-fatal errors (e.g., a thread which did not stop in time) can be
    /// retried by the caller.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ThreadStopTimeout { .. }
            | Self::RegisterRead { .. }
            | Self::InvalidSlot
            | Self::UnknownThread(_) => false,
            Self::Program { failures } => failures.iter().any(Self::is_fatal),
            _ => true,
        }
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
