use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hwtrap_debugger::{AwaitOutcome, ContinueDecision, DebugEvent, Tracer};
use miette::IntoDiagnostic;
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use crate::WatchConfig;

/// Time given to [Tracer::await_event] between two interruption checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_: c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Conditions ending a watch session, besides `Ctrl-C` and the process exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchLimits {
    /// Maximum number of reported hits.
    pub count: Option<u64>,

    /// Maximum duration of the session.
    pub duration: Option<Duration>,
}

impl WatchLimits {
    fn reached(&self, hits: u64, deadline: Option<Instant>) -> bool {
        self.count.is_some_and(|count| hits >= count)
            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Runs the subcommand for watching a running process.
pub fn evaluate_watch(config: String, limits: WatchLimits, pid: u64) -> miette::Result<()> {
    let config = parse_watch_config(config)?;
    let watchpoints = config.watchpoints().into_diagnostic()?;

    let handler = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // SAFETY: the handler only stores to an atomic
    unsafe { sigaction(Signal::SIGINT, &handler) }.into_diagnostic()?;

    let mut tracer = Tracer::attach(pid, config.tracer_config()).into_diagnostic()?;

    for watchpoint in watchpoints {
        let res = tracer.set_hardware_breakpoint(
            watchpoint.address,
            watchpoint.slot,
            watchpoint.trigger,
            watchpoint.size,
            true,
        );

        match res {
            Ok(()) => tracing::info!(
                address = format_args!("{:#x}", watchpoint.address),
                slot = ?watchpoint.slot,
                trigger = ?watchpoint.trigger,
                "watching"
            ),
            Err(e) if !e.is_fatal() => {
                tracing::warn!(slot = ?watchpoint.slot, error = %e, "partially programmed")
            }
            Err(e) => return Err(e).into_diagnostic(),
        }
    }

    let deadline = limits.duration.map(|duration| Instant::now() + duration);
    let mut hits = 0;

    while !INTERRUPTED.load(Ordering::Relaxed) && !limits.reached(hits, deadline) {
        match tracer.await_event(POLL_INTERVAL).into_diagnostic()? {
            AwaitOutcome::Breakpoint(event) => {
                report_hit(&event);
                hits += 1;

                tracer
                    .handle_event(event, ContinueDecision::Handled)
                    .into_diagnostic()?;
            }
            AwaitOutcome::ProcessExited(status) => {
                tracing::info!(?status, hits, "process exited");
                return Ok(());
            }
            AwaitOutcome::ThreadExited { thread_id, status } => {
                tracing::debug!(thread_id, ?status, "thread exited")
            }
            AwaitOutcome::Forwarded { thread_id, signal } => {
                tracing::debug!(thread_id, ?signal, "signal forwarded")
            }
            AwaitOutcome::TimedOut => (),
        }
    }

    tracing::info!(hits, "detaching");

    tracer.detach().into_diagnostic()
}

fn report_hit(event: &DebugEvent) {
    let exception = event.exception();

    tracing::info!(
        thread_id = event.thread_id(),
        slot = ?exception.caused_by,
        ip = format_args!("{:#x}", exception.registers.instr_addr()),
        sp = format_args!("{:#x}", exception.registers.stack_addr()),
        "hit"
    );

    tracing::debug!(registers = ?exception.registers);
}

fn parse_watch_config(config: String) -> miette::Result<WatchConfig> {
    let path = Path::new(&config);

    let config = if let Some((filename, "kdl")) = path
        .file_name()
        .and_then(OsStr::to_str)
        .zip(path.extension().and_then(OsStr::to_str))
    {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        knus::parse(filename, &content)?
    } else {
        knus::parse("<content>", &config)?
    };

    Ok(config)
}
