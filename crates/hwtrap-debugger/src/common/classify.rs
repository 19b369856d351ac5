use super::event::{ContinueDecision, DebugEvent, ExceptionInfo};
use super::registers::{BreakpointRegister, DebugStatus, STATUS_REGISTER};
use super::resume::resume_thread;
use super::target::{Signal, TargetControl, TargetError};

/// Outcome of classifying a signal stop.
#[derive(Debug)]
pub enum Classification {
    /// The thread stopped on a hardware breakpoint, and is still stopped.
    Breakpoint(DebugEvent),

    /// The thread stopped for another reason, and was resumed with the
    /// given signal forwarded.
    Forwarded(Signal),
}

/// Classifies the signal stop of a thread.
///
/// Unless a hardware breakpoint is reported, the thread is resumed with its
/// original signal, even if reading its registers failed.
pub fn classify<T: TargetControl>(
    target: &mut T,
    thread_id: u64,
    signal: Signal,
) -> crate::Result<Classification> {
    if signal != Signal::Trap {
        resume_thread(target, thread_id, ContinueDecision::NotHandled)?;
        return Ok(Classification::Forwarded(signal));
    }

    match read_exception(target, thread_id) {
        Ok(Some(exception)) => {
            tracing::debug!(
                thread_id,
                slot = ?exception.caused_by,
                addr = format_args!("{:#x}", exception.registers.instr_addr()),
                "hardware breakpoint triggered"
            );

            Ok(Classification::Breakpoint(DebugEvent::new(
                thread_id, exception,
            )))
        }
        Ok(None) => {
            tracing::debug!(thread_id, "trap not caused by a hardware breakpoint");

            resume_thread(target, thread_id, ContinueDecision::NotHandled)?;
            Ok(Classification::Forwarded(signal))
        }
        Err(source) => {
            if let Err(e) = resume_thread(target, thread_id, ContinueDecision::NotHandled) {
                tracing::error!(thread_id, error = %e, "thread left stopped");
            }

            Err(crate::Error::RegisterRead { thread_id, source })
        }
    }
}

/// Decodes `DR6` and captures the registers of a trapping thread.
///
/// The fired flags are cleared afterwards, so that a later trap of the
/// thread isn't attributed to the same slot.
fn read_exception<T: TargetControl>(
    target: &mut T,
    thread_id: u64,
) -> Result<Option<ExceptionInfo>, TargetError> {
    let status = DebugStatus::new(target.read_debug_register(thread_id, STATUS_REGISTER)?);

    let caused_by = status.fired_slot();
    if caused_by == BreakpointRegister::Invalid {
        return Ok(None);
    }

    let registers = target.read_registers(thread_id)?;

    target.write_debug_register(
        thread_id,
        STATUS_REGISTER,
        status.with_fired_cleared().raw(),
    )?;

    Ok(Some(ExceptionInfo {
        caused_by,
        registers,
    }))
}
