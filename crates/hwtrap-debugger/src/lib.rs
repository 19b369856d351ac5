//! This crate provides a hardware breakpoint debugging engine.
//!
//! The engine attaches to a running process (on the **same host machine**),
//! programs the CPU debug registers of every thread of that process, and
//! reports which hardware breakpoint slot fired along with a snapshot of the
//! general-purpose registers of the trapping thread.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hwtrap_debugger::{
//!     AwaitOutcome, BreakpointRegister, BreakpointSize, BreakpointTrigger, ContinueDecision,
//!     Tracer, TracerConfig,
//! };
//!
//! # fn main() -> hwtrap_debugger::Result<()> {
//! let mut tracer = Tracer::attach(1234, TracerConfig::default())?;
//!
//! tracer.set_hardware_breakpoint(
//!     0x7fff_0000_1000,
//!     BreakpointRegister::Slot0,
//!     BreakpointTrigger::Write,
//!     BreakpointSize::Size4,
//!     true,
//! )?;
//!
//! loop {
//!     match tracer.await_event(Duration::from_millis(100))? {
//!         AwaitOutcome::Breakpoint(event) => {
//!             // inspect `event.exception().registers` here
//!             tracer.handle_event(event, ContinueDecision::Handled)?;
//!         }
//!         AwaitOutcome::ProcessExited(_) => break,
//!         _ => (),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Supported Platforms
//!
//! <table>
//!     <thead>
//!         <tr>
//!             <th>Host Machine</th>
//!             <th>Debuggee Platform</th>
//!         </tr>
//!     </thead>
//!     <tbody>
//!         <tr>
//!             <td>Linux <code>x86_64</code></td>
//!             <td><code>x86_64</code></td>
//!         </tr>
//!         <tr>
//!             <td>Linux <code>i386</code></td>
//!             <td><code>i386</code></td>
//!         </tr>
//!     </tbody>
//! </table>

mod common;
mod error;
mod sys;

pub use self::common::config::TracerConfig;
pub use self::common::event::{AwaitOutcome, ContinueDecision, DebugEvent, ExceptionInfo};
pub use self::common::registers::{
    BreakpointRegister, BreakpointSize, BreakpointTrigger, DebugControl, DebugStatus, Registers,
};
pub use self::common::stop::{RetryPolicy, StopRequest, StopState};
pub use self::common::target::{ExitStatus, Signal, TargetControl, TargetError, WaitEvent};
pub use self::common::tracer::Tracer;
pub use self::common::waiter::PollPolicy;
pub use self::error::{Error, Result};
pub use self::sys::LinuxTarget;
