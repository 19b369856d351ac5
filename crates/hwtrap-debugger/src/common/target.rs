use super::registers::Registers;

/// Signal as seen by a traced thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Trace/breakpoint trap (`SIGTRAP`).
    Trap,

    /// Stop request (`SIGSTOP`).
    Stop,

    /// Any other signal, by number.
    Other(i32),
}

/// Exit status of a thread or process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal termination with an exit code.
    Code(i32),

    /// Termination by a signal.
    Signal(i32),
}

/// Raw state change of a traced thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitEvent {
    /// The thread stopped on delivery of a signal.
    Stopped {
        /// ID of the stopped thread.
        thread_id: u64,

        /// Signal being delivered.
        signal: Signal,
    },

    /// The thread stopped after spawning a (traced) thread.
    Cloned {
        /// ID of the spawning thread.
        thread_id: u64,

        /// ID of the new thread.
        new_thread_id: u64,
    },

    /// The thread stopped on another tracing event.
    Event {
        /// ID of the stopped thread.
        thread_id: u64,

        /// OS-specific event code.
        event: i32,
    },

    /// The thread has terminated.
    Exited {
        /// ID of the terminated thread.
        thread_id: u64,

        /// Exit status.
        status: ExitStatus,
    },
}

impl WaitEvent {
    /// Returns the ID of the thread concerned by the event.
    pub const fn thread_id(&self) -> u64 {
        match *self {
            Self::Stopped { thread_id, .. }
            | Self::Cloned { thread_id, .. }
            | Self::Event { thread_id, .. }
            | Self::Exited { thread_id, .. } => thread_id,
        }
    }
}

/// Error returned by a [TargetControl] implementation.
#[derive(thiserror::Error, Debug)]
pub enum TargetError {
    /// The thread or process no longer exists (or isn't traced).
    #[error("no such thread")]
    Gone,

    /// The operation was refused (e.g., the thread is already traced).
    #[error("operation not permitted")]
    NotPermitted,

    /// There is no traced thread left to wait for.
    #[error("no traced thread to wait for")]
    NoTracees,

    /// Any other OS error.
    #[error(transparent)]
    Os(#[from] std::io::Error),
}

/// Trait implementing the OS-specific control of a traced process.
///
/// Except for [attach](Self::attach), [list_threads](Self::list_threads),
/// [try_wait](Self::try_wait) and [request_stop](Self::request_stop), every
/// function requires the given thread to be in a stopped state.
pub trait TargetControl {
    /// Starts tracing a single thread.
    ///
    /// The thread is asked to stop, and the stop is later reported by
    /// [try_wait](Self::try_wait). Attaching to an already traced thread
    /// fails with [NotPermitted](TargetError::NotPermitted).
    fn attach(&mut self, thread_id: u64) -> Result<(), TargetError>;

    /// Makes threads spawned by the given thread traced automatically.
    fn trace_clones(&mut self, thread_id: u64) -> Result<(), TargetError>;

    /// Stops tracing a single thread, delivering an optional signal.
    fn detach(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError>;

    /// Lists the live threads of a process.
    fn list_threads(&self, process_id: u64) -> Result<Vec<u64>, TargetError>;

    /// Reaps the next state change of a traced thread, without blocking.
    ///
    /// If `thread_id` is specified, only that thread is considered.
    fn try_wait(&mut self, thread_id: Option<u64>) -> Result<Option<WaitEvent>, TargetError>;

    /// Asks a single thread of a process to stop.
    fn request_stop(&mut self, process_id: u64, thread_id: u64) -> Result<(), TargetError>;

    /// Returns the signal the stopped thread is about to receive.
    fn pending_signal(&self, thread_id: u64) -> Result<Signal, TargetError>;

    /// Resumes the thread, delivering an optional signal.
    fn resume(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError>;

    /// Reads a debug register (`DR0`..`DR7`).
    fn read_debug_register(&self, thread_id: u64, index: usize) -> Result<u64, TargetError>;

    /// Writes a debug register (`DR0`..`DR7`).
    fn write_debug_register(
        &mut self,
        thread_id: u64,
        index: usize,
        value: u64,
    ) -> Result<(), TargetError>;

    /// Reads the general-purpose registers.
    fn read_registers(&self, thread_id: u64) -> Result<Registers, TargetError>;
}
