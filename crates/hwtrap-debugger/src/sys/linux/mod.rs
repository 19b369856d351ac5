mod error;
mod regs;

use std::ffi::c_void;
use std::io;
use std::mem;

use nix::errno::Errno;
use nix::libc::{self, c_int, c_long};
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::common::registers::Registers;
use crate::common::target::{ExitStatus, Signal, TargetControl, TargetError, WaitEvent};

const DR0_OFFSET: usize = mem::offset_of!(libc::user, u_debugreg);

/// [TargetControl] implementation based on `ptrace`.
///
/// # Warning
///
/// Linux only lets the thread which attached to a tracee control it. Every
/// function must be called from that thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxTarget;

fn pid(thread_id: u64) -> Pid {
    Pid::from_raw(thread_id as i32)
}

const fn debug_register_offset(index: usize) -> usize {
    DR0_OFFSET + index * mem::size_of::<c_long>()
}

const fn signal_number(signal: Signal) -> c_int {
    match signal {
        Signal::Trap => libc::SIGTRAP,
        Signal::Stop => libc::SIGSTOP,
        Signal::Other(signo) => signo,
    }
}

const fn signal_from_number(signo: c_int) -> Signal {
    match signo {
        libc::SIGTRAP => Signal::Trap,
        libc::SIGSTOP => Signal::Stop,
        signo => Signal::Other(signo),
    }
}

/// Issues a `ptrace` request delivering a signal.
///
/// Signals are passed by number, since real-time signals can't be
/// represented by [nix].
fn ptrace_with_signal(
    request: ptrace::Request,
    thread_id: u64,
    signal: Option<Signal>,
) -> Result<(), TargetError> {
    let signo = signal.map_or(0, signal_number);

    unsafe {
        Errno::result(libc::ptrace(
            request as u32,
            thread_id as libc::pid_t,
            std::ptr::null_mut::<c_void>(),
            signo as c_long,
        ))?
    };

    Ok(())
}

impl TargetControl for LinuxTarget {
    fn attach(&mut self, thread_id: u64) -> Result<(), TargetError> {
        ptrace::attach(pid(thread_id))?;
        Ok(())
    }

    fn trace_clones(&mut self, thread_id: u64) -> Result<(), TargetError> {
        ptrace::setoptions(pid(thread_id), ptrace::Options::PTRACE_O_TRACECLONE)?;
        Ok(())
    }

    fn detach(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError> {
        ptrace_with_signal(ptrace::Request::PTRACE_DETACH, thread_id, signal)
    }

    fn list_threads(&self, process_id: u64) -> Result<Vec<u64>, TargetError> {
        let entries = std::fs::read_dir(format!("/proc/{process_id}/task")).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                TargetError::Gone
            } else {
                TargetError::Os(e)
            }
        })?;

        let mut thread_ids = Vec::new();

        for entry in entries {
            if let Some(thread_id) = entry?.file_name().to_str().and_then(|s| s.parse().ok()) {
                thread_ids.push(thread_id);
            }
        }

        thread_ids.sort_unstable();

        Ok(thread_ids)
    }

    fn try_wait(&mut self, thread_id: Option<u64>) -> Result<Option<WaitEvent>, TargetError> {
        // status decoded by hand, since `nix::sys::wait` can't represent
        // real-time signals
        let wait_pid = thread_id.map_or(-1, |id| id as libc::pid_t);
        let flags = libc::WNOHANG | libc::__WALL | libc::__WNOTHREAD;
        let mut status: c_int = 0;

        let reaped = Errno::result(unsafe { libc::waitpid(wait_pid, &mut status, flags) })?;
        if reaped == 0 {
            return Ok(None);
        }

        let thread_id = reaped as u64;

        let event = if libc::WIFEXITED(status) {
            WaitEvent::Exited {
                thread_id,
                status: ExitStatus::Code(libc::WEXITSTATUS(status)),
            }
        } else if libc::WIFSIGNALED(status) {
            WaitEvent::Exited {
                thread_id,
                status: ExitStatus::Signal(libc::WTERMSIG(status)),
            }
        } else if libc::WIFSTOPPED(status) {
            let signo = libc::WSTOPSIG(status);
            let event = status >> 16;

            if signo == libc::SIGTRAP && event == libc::PTRACE_EVENT_CLONE {
                let new_thread_id = ptrace::getevent(pid(thread_id))? as u64;

                WaitEvent::Cloned {
                    thread_id,
                    new_thread_id,
                }
            } else if event != 0 {
                WaitEvent::Event { thread_id, event }
            } else {
                WaitEvent::Stopped {
                    thread_id,
                    signal: signal_from_number(signo),
                }
            }
        } else {
            tracing::trace!(thread_id, status, "ignoring wait status");
            return Ok(None);
        };

        Ok(Some(event))
    }

    fn request_stop(&mut self, process_id: u64, thread_id: u64) -> Result<(), TargetError> {
        unsafe {
            Errno::result(libc::syscall(
                libc::SYS_tgkill,
                process_id as libc::pid_t,
                thread_id as libc::pid_t,
                libc::SIGSTOP,
            ))?
        };

        Ok(())
    }

    fn pending_signal(&self, thread_id: u64) -> Result<Signal, TargetError> {
        let info = ptrace::getsiginfo(pid(thread_id))?;
        Ok(signal_from_number(info.si_signo))
    }

    fn resume(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError> {
        ptrace_with_signal(ptrace::Request::PTRACE_CONT, thread_id, signal)
    }

    fn read_debug_register(&self, thread_id: u64, index: usize) -> Result<u64, TargetError> {
        let offset = debug_register_offset(index);
        let value = ptrace::read_user(pid(thread_id), offset as *mut _)?;

        Ok(value as libc::c_ulong as u64)
    }

    fn write_debug_register(
        &mut self,
        thread_id: u64,
        index: usize,
        value: u64,
    ) -> Result<(), TargetError> {
        let offset = debug_register_offset(index);
        ptrace::write_user(pid(thread_id), offset as *mut _, value as c_long)?;

        Ok(())
    }

    fn read_registers(&self, thread_id: u64) -> Result<Registers, TargetError> {
        let regs = ptrace::getregs(pid(thread_id))?;
        Ok(regs.into())
    }
}
