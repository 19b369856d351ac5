//! C ABI of the [hwtrap_debugger] engine.
//!
//! A single process can be debugged at a time per thread. Every function
//! must be called from the thread which attached to the process.

#![allow(non_snake_case)]

mod types;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use hwtrap_debugger::{AwaitOutcome, Tracer, TracerConfig};

pub use self::types::{
    DebugContinueStatus, DebugEvent, ExceptionInfo, HardwareBreakpointRegister,
    HardwareBreakpointSize, HardwareBreakpointTrigger, InvalidEnumValue,
};

/// Debugging session of the calling thread.
struct Session {
    tracer: Tracer,

    /// Events handed to the caller, by thread ID.
    events: BTreeMap<u64, hwtrap_debugger::DebugEvent>,
}

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

fn with_session<R>(process_id: Option<u32>, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
    SESSION.with_borrow_mut(|session| match session {
        Some(session) if process_id.is_none_or(|id| session.tracer.process_id() == id as u64) => {
            Some(f(session))
        }
        _ => {
            tracing::warn!(process_id, "no debugging session");
            None
        }
    })
}

/// Attaches to every thread of a running process.
///
/// Returns false if the process could not be attached to, or if another
/// process is already debugged by the calling thread.
#[unsafe(no_mangle)]
pub extern "C" fn AttachDebuggerToProcess(process_id: u32) -> bool {
    SESSION.with_borrow_mut(|session| {
        if let Some(session) = session {
            tracing::warn!(
                process_id,
                debugged = session.tracer.process_id(),
                "already debugging a process"
            );
            return false;
        }

        match Tracer::attach(process_id as u64, TracerConfig::default()) {
            Ok(tracer) => {
                *session = Some(Session {
                    tracer,
                    events: BTreeMap::new(),
                });
                true
            }
            Err(e) => {
                tracing::error!(process_id, error = %e, "failed to attach");
                false
            }
        }
    })
}

/// Detaches from a process, disabling its hardware breakpoints.
///
/// Threads left stopped by pending debug events are resumed.
#[unsafe(no_mangle)]
pub extern "C" fn DetachDebuggerFromProcess(process_id: u32) {
    let session = SESSION.with_borrow_mut(|session| {
        session.take_if(|session| session.tracer.process_id() == process_id as u64)
    });

    // threads held by pending events are released by the detach
    let Some(Session { tracer, .. }) = session else {
        tracing::warn!(process_id, "process not debugged");
        return;
    };

    if let Err(e) = tracer.detach() {
        tracing::error!(process_id, error = %e, "failed to detach");
    }
}

/// Waits for the next hardware breakpoint trap, for at most `timeout_ms`
/// milliseconds.
///
/// Returns false on timeout, or if the thread stopped for another reason
/// and was resumed.
///
/// # Safety
///
/// `event` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn AwaitDebugEvent(event: *mut DebugEvent, timeout_ms: u32) -> bool {
    // SAFETY: guaranteed by the caller
    let Some(event) = (unsafe { event.as_mut() }) else {
        return false;
    };

    let timeout = Duration::from_millis(timeout_ms as u64);

    with_session(None, |session| match session.tracer.await_event(timeout) {
        Ok(AwaitOutcome::Breakpoint(debug_event)) => {
            *event = DebugEvent::new(&debug_event);
            session.events.insert(debug_event.thread_id(), debug_event);
            true
        }
        Ok(outcome) => {
            tracing::trace!(?outcome, "no breakpoint");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to wait for debug event");
            false
        }
    })
    .unwrap_or(false)
}

/// Resumes the thread of a debug event, according to its continue status.
///
/// # Safety
///
/// `event` must be null or point to an event filled by [AwaitDebugEvent].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn HandleDebugEvent(event: *const DebugEvent) {
    // SAFETY: guaranteed by the caller
    let Some(event) = (unsafe { event.as_ref() }) else {
        return;
    };

    let thread_id = event.thread_id as u64;

    let decision = match DebugContinueStatus::try_from(event.continue_status) {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::warn!(thread_id, error = %e, "delivering trap signal");
            DebugContinueStatus::NotHandled.into()
        }
    };

    with_session(None, |session| {
        let Some(debug_event) = session.events.remove(&thread_id) else {
            tracing::warn!(thread_id, "no pending debug event");
            return;
        };

        if let Err(e) = session.tracer.handle_event(debug_event, decision) {
            tracing::error!(thread_id, error = %e, "failed to resume thread");
        }
    });
}

/// Programs a hardware breakpoint slot in every thread of a process.
///
/// If `set` is false, the slot is disabled. Returns false if the arguments
/// are invalid or if a thread could not be programmed.
#[unsafe(no_mangle)]
pub extern "C" fn SetHardwareBreakpoint(
    process_id: u32,
    address: usize,
    reg: i32,
    trigger: i32,
    size: i32,
    set: bool,
) -> bool {
    let args = HardwareBreakpointRegister::try_from(reg).and_then(|reg| {
        let trigger = HardwareBreakpointTrigger::try_from(trigger)?;
        let size = HardwareBreakpointSize::try_from(size)?;
        Ok((reg, trigger, size))
    });

    let (reg, trigger, size) = match args {
        Ok(args) => args,
        Err(e) => {
            tracing::error!(error = %e, "invalid hardware breakpoint");
            return false;
        }
    };

    with_session(Some(process_id), |session| {
        session
            .tracer
            .set_hardware_breakpoint(
                address as u64,
                reg.into(),
                trigger.into(),
                size.into(),
                set,
            )
            .inspect_err(|e| tracing::error!(process_id, error = %e, "failed to program"))
            .is_ok()
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::{
        AwaitDebugEvent, DebugEvent, DetachDebuggerFromProcess, HandleDebugEvent,
        SetHardwareBreakpoint,
    };

    #[test]
    fn no_session() {
        let mut event = DebugEvent::default();

        assert!(!SetHardwareBreakpoint(1234, 0x1000, 1, 2, 4, true));
        assert!(!unsafe { AwaitDebugEvent(&mut event, 10) });

        // no-ops
        unsafe { HandleDebugEvent(&event) };
        DetachDebuggerFromProcess(1234);
    }

    #[test]
    fn null_event() {
        assert!(!unsafe { AwaitDebugEvent(std::ptr::null_mut(), 10) });
        unsafe { HandleDebugEvent(std::ptr::null()) };
    }

    #[test]
    fn invalid_arguments() {
        // invalid register, trigger, size
        assert!(!SetHardwareBreakpoint(1234, 0x1000, 7, 2, 4, true));
        assert!(!SetHardwareBreakpoint(1234, 0x1000, 1, 5, 4, true));
        assert!(!SetHardwareBreakpoint(1234, 0x1000, 1, 2, 3, true));
    }
}
