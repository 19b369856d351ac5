use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::marker::PhantomData;
use std::time::Duration;

use super::breakpoint::{HardwareSlots, Watchpoint};
use super::classify::{Classification, classify};
use super::config::TracerConfig;
use super::event::{AwaitOutcome, ContinueDecision, DebugEvent};
use super::registers::{BreakpointRegister, BreakpointSize, BreakpointTrigger};
use super::resume::resume_thread;
use super::stop::{StopRequest, StopState};
use super::target::{Signal, TargetControl, TargetError, WaitEvent};
use super::thread::ThreadManager;
use super::waiter::{Deadline, TimedWaiter};
use crate::error::{Error, Result};
use crate::sys::LinuxTarget;

/// Hardware breakpoint debugger of a single process.
///
/// Every thread of the process is traced, including the ones it spawns
/// later on. Dropping the tracer detaches from the process.
///
/// Linux only lets the thread which attached to a process control it, so
/// a tracer can't leave the thread which created it:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
///
/// assert_send::<hwtrap_debugger::Tracer>();
/// ```
pub struct Tracer<T: TargetControl = LinuxTarget> {
    target: T,
    process_id: u64,
    config: TracerConfig,
    threads: ThreadManager,
    slots: HardwareSlots,

    /// State changes reaped while stopping a thread, to be reported by
    /// [await_event](Self::await_event).
    pending: VecDeque<WaitEvent>,

    waiter: TimedWaiter,
    attached: bool,

    /// Neither `Send` nor `Sync`.
    _thread_bound: PhantomData<*const ()>,
}

/// How to treat state changes other than the requested stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OnEvent {
    /// The event is queued and the thread stays stopped.
    Stash,

    /// The event is processed right away and the wait goes on.
    Forward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThreadStop {
    Stopped,
    Vanished,
    TimedOut,
}

impl Tracer<LinuxTarget> {
    /// Attaches to every thread of a running process.
    ///
    /// On success, the threads of the process are running again.
    pub fn attach(process_id: u64, config: TracerConfig) -> Result<Self> {
        Self::attach_with(LinuxTarget::default(), process_id, config)
    }
}

impl<T: TargetControl> Tracer<T> {
    /// Attaches to every thread of a running process, controlled by the
    /// given target.
    pub fn attach_with(target: T, process_id: u64, config: TracerConfig) -> Result<Self> {
        let mut tracer = Self {
            target,
            process_id,
            config,
            threads: ThreadManager::new(),
            slots: HardwareSlots::default(),
            pending: VecDeque::new(),
            waiter: TimedWaiter::new(config.poll),
            attached: true,
            _thread_bound: PhantomData,
        };

        if !tracer.attach_thread(process_id)? {
            return Err(Error::Attach {
                process_id,
                source: TargetError::Gone,
            });
        }

        // threads may be spawned before clone tracing is enabled in their
        // parent, so the process is scanned until nothing new shows up
        let mut seen = BTreeSet::from([process_id]);
        loop {
            let new_threads: Vec<u64> = tracer
                .list_threads()?
                .into_iter()
                .filter(|thread_id| seen.insert(*thread_id))
                .collect();

            if new_threads.is_empty() {
                break;
            }

            for thread_id in new_threads {
                tracer.attach_thread(thread_id)?;
            }
        }

        tracing::info!(
            process_id,
            threads = ?tracer.threads.ids(),
            "attached to process"
        );

        Ok(tracer)
    }

    /// Returns the ID of the traced process.
    pub const fn process_id(&self) -> u64 {
        self.process_id
    }

    /// Returns the configuration of the tracer.
    pub const fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Returns the IDs of the traced threads, in ascending order.
    pub fn thread_ids(&self) -> Vec<u64> {
        self.threads.ids()
    }

    /// Detaches from every thread of the process.
    ///
    /// Hardware breakpoints are disabled, and the threads are left running.
    pub fn detach(mut self) -> Result<()> {
        self.detach_all()
    }

    /// Waits for the next debug event, for at most `timeout`.
    ///
    /// State changes which don't concern the caller (e.g., a new thread
    /// starting) are processed internally and don't end the wait. A timeout
    /// leaves the traced threads untouched.
    pub fn await_event(&mut self, timeout: Duration) -> Result<AwaitOutcome> {
        if !self.attached || self.threads.is_empty() {
            return Err(Error::NoTracedThreads);
        }

        let deadline = Deadline::after(timeout);

        loop {
            let event = match self.pending.pop_front() {
                Some(event) => {
                    self.threads.release(event.thread_id());
                    event
                }
                None => match self.waiter.wait(&mut self.target, None, deadline) {
                    Ok(Some(event)) => event,
                    Ok(None) => return Ok(AwaitOutcome::TimedOut),
                    Err(TargetError::NoTracees) => {
                        self.forget_process();
                        return Err(Error::NoTracedThreads);
                    }
                    Err(e) => return Err(Error::Wait(e)),
                },
            };

            if let Some(outcome) = self.dispatch(event)? {
                return Ok(outcome);
            }
        }
    }

    /// Resumes the thread of a debug event.
    ///
    /// If `decision` is [NotHandled](ContinueDecision::NotHandled), the trap
    /// signal is delivered to the thread.
    pub fn handle_event(&mut self, event: DebugEvent, decision: ContinueDecision) -> Result<()> {
        let thread_id = event.thread_id();

        if !self.threads.contains(thread_id) {
            return Err(Error::UnknownThread(thread_id));
        }

        self.threads.release(thread_id);
        resume_thread(&mut self.target, thread_id, decision)
    }

    /// Programs a hardware breakpoint slot in every thread of the process.
    ///
    /// The configuration is also applied to threads spawned later on. If
    /// `enable` is false, the slot is disabled and the other arguments are
    /// ignored.
    ///
    /// Threads which don't stop in time are reported by
    /// [ThreadStopTimeout](Error::ThreadStopTimeout), after every other
    /// thread was programmed. They receive the configuration as soon as
    /// they stop.
    ///
    /// A thread failing for another reason doesn't prevent the others from
    /// being programmed. Every failure is reported by
    /// [Program](Error::Program), and the failing threads receive the
    /// whole configuration the next time the tracer stops them.
    pub fn set_hardware_breakpoint(
        &mut self,
        address: u64,
        slot: BreakpointRegister,
        trigger: BreakpointTrigger,
        size: BreakpointSize,
        enable: bool,
    ) -> Result<()> {
        let Some(index) = slot.index() else {
            return Err(Error::InvalidSlot);
        };

        if !self.attached {
            return Err(Error::NoTracedThreads);
        }

        let watchpoint = enable.then_some(Watchpoint {
            address,
            trigger,
            size,
        });
        self.slots.set(index, watchpoint);

        tracing::debug!(
            slot = index,
            addr = format_args!("{address:#x}"),
            ?watchpoint,
            "programming hardware breakpoint"
        );

        let mut done = BTreeSet::new();
        let mut timed_out = Vec::new();
        let mut failures = Vec::new();

        loop {
            // threads spawned without being reported yet are traced already,
            // their initial stop is awaited
            for thread_id in self.list_threads()? {
                if !self.threads.contains(thread_id) {
                    self.threads.register_spawned(thread_id);
                }
            }

            let todo: Vec<u64> = self
                .threads
                .ids()
                .into_iter()
                .filter(|thread_id| done.insert(*thread_id))
                .collect();

            if todo.is_empty() {
                break;
            }

            for thread_id in todo {
                match self.program_thread(thread_id, index) {
                    Ok(ThreadStop::TimedOut) => timed_out.push(thread_id),
                    Ok(_) => (),
                    Err(e) => {
                        tracing::warn!(thread_id, error = %e, "failed to program thread");

                        self.threads.mark_needs_slots(thread_id);
                        failures.push(e);
                    }
                }
            }
        }

        if !timed_out.is_empty() {
            tracing::warn!(threads = ?timed_out, "threads did not stop in time");

            let timeout = Error::ThreadStopTimeout {
                thread_ids: timed_out,
            };

            if failures.is_empty() {
                return Err(timeout);
            }

            failures.push(timeout);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Program { failures })
        }
    }

    fn list_threads(&self) -> Result<Vec<u64>> {
        self.target
            .list_threads(self.process_id)
            .map_err(|source| Error::ThreadList {
                process_id: self.process_id,
                source,
            })
    }

    /// Attaches to a single thread and waits for its initial stop.
    ///
    /// Returns false if the thread vanished in the meantime.
    fn attach_thread(&mut self, thread_id: u64) -> Result<bool> {
        match self.target.attach(thread_id) {
            Ok(()) => self.threads.register_attached(thread_id),
            Err(TargetError::Gone) if thread_id != self.process_id => return Ok(false),
            Err(TargetError::NotPermitted) if thread_id != self.process_id => {
                // spawned by an already traced thread
                self.threads.register_spawned(thread_id);
                return Ok(true);
            }
            Err(source) => {
                return Err(Error::Attach {
                    process_id: self.process_id,
                    source,
                });
            }
        }

        let deadline = Deadline::after(self.config.attach_timeout);

        match self.waiter.wait(&mut self.target, Some(thread_id), deadline) {
            Ok(Some(WaitEvent::Stopped {
                signal: Signal::Stop,
                ..
            })) => self.threads.set_stop_pending(thread_id, false),
            Ok(Some(WaitEvent::Exited { .. }))
            | Err(TargetError::Gone | TargetError::NoTracees) => {
                self.threads.register_exit(thread_id);
                return Ok(false);
            }
            Ok(Some(event)) => {
                // stopped for another reason, the stop signal is still queued
                self.threads.hold(thread_id);
                self.pending.push_back(event);
            }
            Ok(None) => return Err(Error::AttachTimeout { thread_id }),
            Err(e) => return Err(Error::Wait(e)),
        }

        self.target
            .trace_clones(thread_id)
            .map_err(|source| Error::Attach {
                process_id: self.process_id,
                source,
            })?;

        if !self.threads.is_held(thread_id) {
            self.resume_quietly(thread_id)?;
        }

        tracing::debug!(thread_id, "attached to thread");

        Ok(true)
    }

    /// Stops a single thread, following the retry policy.
    fn stop_thread(&mut self, thread_id: u64, on_event: OnEvent) -> Result<ThreadStop> {
        let mut request = StopRequest::new(self.config.stop_retry);

        loop {
            match request.state() {
                StopState::Requesting => {
                    // the initial stop of a new thread is already on its way
                    if !self.threads.is_stop_pending(thread_id) || request.failed_attempts() > 0 {
                        match self.target.request_stop(self.process_id, thread_id) {
                            Ok(()) => self.threads.set_stop_pending(thread_id, true),
                            Err(TargetError::Gone) => return Ok(ThreadStop::Vanished),
                            Err(source) => return Err(Error::Stop { thread_id, source }),
                        }
                    }

                    request.requested();
                }
                StopState::Waiting { wait } => {
                    let deadline = Deadline::after(wait);

                    match self.waiter.wait(&mut self.target, Some(thread_id), deadline) {
                        Ok(None) => {
                            tracing::debug!(
                                thread_id,
                                attempt = request.failed_attempts(),
                                "thread did not stop yet"
                            );
                            request.timed_out();
                        }
                        Ok(Some(WaitEvent::Stopped {
                            signal: Signal::Stop,
                            ..
                        })) => {
                            self.threads.set_stop_pending(thread_id, false);
                            request.stopped();
                        }
                        Ok(Some(event @ WaitEvent::Exited { .. })) => {
                            match on_event {
                                OnEvent::Stash => self.pending.push_back(event),
                                OnEvent::Forward => {
                                    self.dispatch(event)?;
                                }
                            }
                            return Ok(ThreadStop::Vanished);
                        }
                        Ok(Some(event)) => match on_event {
                            OnEvent::Stash => {
                                self.threads.hold(thread_id);
                                self.pending.push_back(event);
                                request.stopped();
                            }
                            OnEvent::Forward => self.forward(event)?,
                        },
                        Err(TargetError::Gone | TargetError::NoTracees) => {
                            return Ok(ThreadStop::Vanished);
                        }
                        Err(e) => return Err(Error::Wait(e)),
                    }
                }
                StopState::Stopped => return Ok(ThreadStop::Stopped),
                StopState::GaveUp => return Ok(ThreadStop::TimedOut),
            }
        }
    }

    /// Stops a thread, programs a slot (or every slot if the thread never
    /// received them) and resumes the thread.
    fn program_thread(&mut self, thread_id: u64, index: usize) -> Result<ThreadStop> {
        if !self.threads.is_held(thread_id) {
            match self.stop_thread(thread_id, OnEvent::Stash)? {
                ThreadStop::Stopped => (),
                ThreadStop::TimedOut => {
                    self.threads.mark_needs_slots(thread_id);
                    return Ok(ThreadStop::TimedOut);
                }
                ThreadStop::Vanished => return Ok(ThreadStop::Vanished),
            }
        }

        let result = if self.threads.take_needs_slots(thread_id) {
            self.slots.replay(&mut self.target, thread_id)
        } else {
            self.slots.apply(&mut self.target, thread_id, index)
        };

        let outcome = match result {
            Ok(()) => Ok(ThreadStop::Stopped),
            Err(TargetError::Gone) => return Ok(ThreadStop::Vanished),
            Err(source) => Err(Error::DebugRegisters { thread_id, source }),
        };

        if !self.threads.is_held(thread_id) {
            self.resume_quietly(thread_id)?;
        }

        outcome
    }

    /// Processes a state change.
    ///
    /// Returns the outcome to report to the caller, if any.
    fn dispatch(&mut self, event: WaitEvent) -> Result<Option<AwaitOutcome>> {
        match event {
            WaitEvent::Stopped {
                thread_id,
                signal: Signal::Stop,
            } => {
                if !self.threads.contains(thread_id) {
                    self.threads.register_spawned(thread_id);
                }
                self.threads.set_stop_pending(thread_id, false);

                if self.threads.take_needs_slots(thread_id) {
                    tracing::debug!(thread_id, "programming new thread");

                    if let Err(e) = self.slots.replay(&mut self.target, thread_id) {
                        tracing::warn!(
                            thread_id,
                            error = %e,
                            "failed to program hardware breakpoints"
                        );
                    }
                }

                self.resume_quietly(thread_id)?;
                Ok(None)
            }
            WaitEvent::Stopped { thread_id, signal } => {
                if !self.threads.contains(thread_id) {
                    self.threads.register_spawned(thread_id);
                }

                match classify(&mut self.target, thread_id, signal)? {
                    Classification::Breakpoint(event) => {
                        self.threads.hold(thread_id);
                        Ok(Some(AwaitOutcome::Breakpoint(event)))
                    }
                    Classification::Forwarded(signal) => {
                        Ok(Some(AwaitOutcome::Forwarded { thread_id, signal }))
                    }
                }
            }
            WaitEvent::Cloned {
                thread_id,
                new_thread_id,
            } => {
                tracing::debug!(thread_id, new_thread_id, "thread spawned");

                self.threads.register_spawned(new_thread_id);
                self.resume_quietly(thread_id)?;
                Ok(None)
            }
            WaitEvent::Event { thread_id, event } => {
                tracing::trace!(thread_id, event, "ignoring tracing event");

                self.resume_quietly(thread_id)?;
                Ok(None)
            }
            WaitEvent::Exited { thread_id, status } => {
                self.threads.register_exit(thread_id);

                // the main thread is reported last
                if thread_id == self.process_id || self.threads.is_empty() {
                    tracing::info!(process_id = self.process_id, ?status, "process exited");

                    self.forget_process();
                    return Ok(Some(AwaitOutcome::ProcessExited(status)));
                }

                tracing::debug!(thread_id, ?status, "thread exited");

                Ok(Some(AwaitOutcome::ThreadExited { thread_id, status }))
            }
        }
    }

    /// Processes a state change seen while detaching.
    fn forward(&mut self, event: WaitEvent) -> Result<()> {
        match self.dispatch(event) {
            Ok(Some(AwaitOutcome::Breakpoint(event))) => {
                self.handle_event(event, ContinueDecision::Handled)
            }
            Ok(_) => Ok(()),
            // the thread was resumed anyway
            Err(Error::RegisterRead { thread_id, source }) => {
                tracing::warn!(thread_id, error = %source, "failed to classify trap");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Resumes a thread stopped by the tracer itself.
    fn resume_quietly(&mut self, thread_id: u64) -> Result<()> {
        match self.target.resume(thread_id, None) {
            Ok(()) | Err(TargetError::Gone) => Ok(()),
            Err(source) => Err(Error::Resume { thread_id, source }),
        }
    }

    fn forget_process(&mut self) {
        self.threads = ThreadManager::new();
        self.pending.clear();
        self.attached = false;
    }

    fn detach_all(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }

        // stashed traps come from hardware breakpoints that are about to be
        // disabled, other signals are delivered on detach
        let mut stashed_signals: BTreeMap<u64, Signal> = self
            .pending
            .drain(..)
            .filter_map(|event| match event {
                WaitEvent::Stopped { thread_id, signal } if signal != Signal::Trap => {
                    Some((thread_id, signal))
                }
                _ => None,
            })
            .collect();

        let mut done = BTreeSet::new();
        let mut failures = Vec::new();

        loop {
            let todo: Vec<u64> = self
                .threads
                .ids()
                .into_iter()
                .filter(|thread_id| done.insert(*thread_id))
                .collect();

            if todo.is_empty() {
                break;
            }

            for thread_id in todo {
                let signal = stashed_signals.remove(&thread_id);

                let result = match self.detach_thread(thread_id, signal) {
                    Ok(ThreadStop::TimedOut) => Err(Error::ThreadStopTimeout {
                        thread_ids: vec![thread_id],
                    }),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                };

                if let Err(e) = result {
                    tracing::warn!(thread_id, error = %e, "failed to detach thread");
                    failures.push(e);
                }
            }
        }

        tracing::info!(process_id = self.process_id, "detached from process");

        self.forget_process();
        self.slots = HardwareSlots::default();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Detach {
                process_id: self.process_id,
                failures,
            })
        }
    }

    fn detach_thread(&mut self, thread_id: u64, mut signal: Option<Signal>) -> Result<ThreadStop> {
        // a stop signal still queued would stop the thread after detaching,
        // so it is consumed first
        if self.threads.is_held(thread_id) && self.threads.is_stop_pending(thread_id) {
            self.threads.release(thread_id);

            match self.target.resume(thread_id, signal.take()) {
                Ok(()) => (),
                Err(TargetError::Gone) => return Ok(ThreadStop::Vanished),
                Err(source) => return Err(Error::Resume { thread_id, source }),
            }
        }

        if !self.threads.is_held(thread_id) {
            match self.stop_thread(thread_id, OnEvent::Forward)? {
                ThreadStop::Stopped => (),
                other => return Ok(other),
            }
        }

        let cleared = match HardwareSlots::clear(&mut self.target, thread_id) {
            Ok(()) => Ok(()),
            Err(TargetError::Gone) => return Ok(ThreadStop::Vanished),
            Err(source) => Err(Error::DebugRegisters { thread_id, source }),
        };

        match self.target.detach(thread_id, signal) {
            Ok(()) | Err(TargetError::Gone) => (),
            Err(source) => return Err(Error::Untrace { thread_id, source }),
        }

        self.threads.register_exit(thread_id);

        tracing::debug!(thread_id, "detached from thread");

        cleared.map(|()| ThreadStop::Stopped)
    }
}

impl<T: TargetControl> Drop for Tracer<T> {
    fn drop(&mut self) {
        if let Err(e) = self.detach_all() {
            tracing::error!(
                process_id = self.process_id,
                error = %e,
                "failed to detach from process"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_log::test;

    use super::Tracer;
    use crate::common::config::TracerConfig;
    use crate::common::event::{AwaitOutcome, ContinueDecision};
    use crate::common::mock::{Call, MockTarget};
    use crate::common::registers::{
        BreakpointRegister, BreakpointSize, BreakpointTrigger, CONTROL_REGISTER, DebugControl,
        STATUS_REGISTER,
    };
    use crate::common::stop::RetryPolicy;
    use crate::common::target::{ExitStatus, Signal, WaitEvent};
    use crate::error::Error;

    const SHORT: Duration = Duration::from_millis(20);

    fn config() -> TracerConfig {
        TracerConfig {
            stop_retry: RetryPolicy {
                max_attempts: 2,
                initial_wait: Duration::from_millis(1),
                max_wait: Duration::from_millis(2),
            },
            attach_timeout: Duration::from_millis(50),
            ..TracerConfig::default()
        }
    }

    fn process(thread_ids: &[u64]) -> MockTarget {
        let mut target = MockTarget::new();
        for &thread_id in thread_ids {
            target.add_thread(thread_id);
        }
        target
    }

    fn attached(thread_ids: &[u64]) -> Tracer<MockTarget> {
        let mut tracer = Tracer::attach_with(process(thread_ids), thread_ids[0], config()).unwrap();
        tracer.target.calls.clear();
        tracer
    }

    fn write_watch(tracer: &mut Tracer<MockTarget>, slot: BreakpointRegister, enable: bool) {
        tracer
            .set_hardware_breakpoint(
                0x1000,
                slot,
                BreakpointTrigger::Write,
                BreakpointSize::Size4,
                enable,
            )
            .unwrap();
    }

    fn expected_dr7(slot: usize) -> u64 {
        DebugControl::new(0)
            .with_enabled(slot, BreakpointTrigger::Write, BreakpointSize::Size4)
            .raw()
    }

    #[test]
    fn attach_every_thread() {
        let tracer = Tracer::attach_with(process(&[100, 101, 102]), 100, config()).unwrap();

        assert_eq!(tracer.process_id(), 100);
        assert_eq!(tracer.thread_ids(), [100, 101, 102]);

        for thread_id in [100, 101, 102] {
            assert!(tracer.target.calls.contains(&Call::Attach(thread_id)));
            assert!(tracer.target.calls.contains(&Call::TraceClones(thread_id)));
            assert_eq!(tracer.target.resumes_of(thread_id), [None]);
        }
    }

    #[test]
    fn attach_missing_process() {
        let Err(err) = Tracer::attach_with(process(&[]), 100, config()) else {
            panic!("attached to missing process");
        };

        assert!(matches!(err, Error::Attach { process_id: 100, .. }));
    }

    #[test]
    fn attach_unresponsive_thread() {
        let mut target = process(&[100, 101]);
        target.thread(101).responsive = false;

        let Err(err) = Tracer::attach_with(target, 100, config()) else {
            panic!("attached to unresponsive thread");
        };

        assert!(matches!(err, Error::AttachTimeout { thread_id: 101 }));
    }

    #[test]
    fn await_times_out() {
        let mut tracer = attached(&[100, 101]);

        let outcome = tracer.await_event(SHORT).unwrap();

        assert!(matches!(outcome, AwaitOutcome::TimedOut));
        assert!(tracer.target.calls.is_empty());
        assert_eq!(tracer.thread_ids(), [100, 101]);
    }

    #[test]
    fn breakpoint_in_every_thread() {
        let mut tracer = attached(&[100, 101, 102]);

        write_watch(&mut tracer, BreakpointRegister::Slot1, true);

        for thread_id in [100, 101, 102] {
            assert_eq!(tracer.target.thread(thread_id).debug_regs[1], 0x1000);
            assert_eq!(tracer.target.dr7(thread_id), expected_dr7(1));
            assert_eq!(tracer.target.resumes_of(thread_id), [None]);
        }

        tracer.target.thread(101).debug_regs[STATUS_REGISTER] = 0b10;
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Trap,
        });

        let AwaitOutcome::Breakpoint(event) = tracer.await_event(SHORT).unwrap() else {
            panic!("breakpoint not reported");
        };
        assert_eq!(event.thread_id(), 101);
        assert_eq!(event.exception().caused_by, BreakpointRegister::Slot1);

        tracer.handle_event(event, ContinueDecision::Handled).unwrap();
        assert_eq!(tracer.target.resumes_of(101), [None, None]);
    }

    #[test]
    fn disable_breakpoint() {
        let mut tracer = attached(&[100, 101]);

        write_watch(&mut tracer, BreakpointRegister::Slot0, true);
        write_watch(&mut tracer, BreakpointRegister::Slot2, true);
        write_watch(&mut tracer, BreakpointRegister::Slot0, false);

        for thread_id in [100, 101] {
            let control = DebugControl::new(tracer.target.dr7(thread_id));
            assert!(!control.is_enabled(0));
            assert!(control.is_enabled(2));
        }
    }

    #[test]
    fn invalid_slot() {
        let mut tracer = attached(&[100, 101]);

        let err = tracer
            .set_hardware_breakpoint(
                0x1000,
                BreakpointRegister::Invalid,
                BreakpointTrigger::Execute,
                BreakpointSize::Size1,
                true,
            )
            .unwrap_err();

        assert!(matches!(err, Error::InvalidSlot));
        assert!(tracer.target.calls.is_empty());
    }

    #[test]
    fn unresponsive_thread_is_skipped() {
        let mut tracer = attached(&[100, 101, 102]);
        tracer.target.thread(101).responsive = false;

        let err = tracer
            .set_hardware_breakpoint(
                0x1000,
                BreakpointRegister::Slot3,
                BreakpointTrigger::Write,
                BreakpointSize::Size4,
                true,
            )
            .unwrap_err();

        let Error::ThreadStopTimeout { thread_ids } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(thread_ids, &[101]);
        assert!(!err.is_fatal());

        assert_eq!(tracer.target.dr7(100), expected_dr7(3));
        assert_eq!(tracer.target.dr7(101), 0);
        assert_eq!(tracer.target.dr7(102), expected_dr7(3));

        // programmed as soon as it eventually stops
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Stop,
        });

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(outcome, AwaitOutcome::TimedOut));
        assert_eq!(tracer.target.dr7(101), expected_dr7(3));
    }

    #[test]
    fn failing_thread_does_not_stop_programming() {
        let mut tracer = attached(&[100, 101, 102]);
        tracer.target.thread(101).broken = true;

        let err = tracer
            .set_hardware_breakpoint(
                0x1000,
                BreakpointRegister::Slot1,
                BreakpointTrigger::Write,
                BreakpointSize::Size4,
                true,
            )
            .unwrap_err();

        let Error::Program { failures } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(matches!(
            failures.as_slice(),
            [Error::DebugRegisters { thread_id: 101, .. }]
        ));
        assert!(err.is_fatal());

        // the threads after the failing one are programmed too
        assert_eq!(tracer.target.dr7(100), expected_dr7(1));
        assert_eq!(tracer.target.dr7(102), expected_dr7(1));
        assert_eq!(tracer.target.resumes_of(101), [None]);

        // programmed at its next stop
        tracer.target.thread(101).broken = false;
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Stop,
        });

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(outcome, AwaitOutcome::TimedOut));
        assert_eq!(tracer.target.dr7(101), expected_dr7(1));
        assert_eq!(tracer.target.thread(101).debug_regs[1], 0x1000);
    }

    #[test]
    fn every_programming_failure_is_reported() {
        let mut tracer = attached(&[100, 101, 102]);
        tracer.target.thread(101).responsive = false;
        tracer.target.thread(102).broken = true;

        let err = tracer
            .set_hardware_breakpoint(
                0x1000,
                BreakpointRegister::Slot0,
                BreakpointTrigger::Write,
                BreakpointSize::Size4,
                true,
            )
            .unwrap_err();

        let Error::Program { failures } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(matches!(
            failures.as_slice(),
            [
                Error::DebugRegisters { thread_id: 102, .. },
                Error::ThreadStopTimeout { thread_ids },
            ] if thread_ids == &[101]
        ));
        assert_eq!(tracer.target.dr7(100), expected_dr7(0));
    }

    #[test]
    fn spawned_thread_inherits_slots() {
        let mut tracer = attached(&[100, 101]);
        write_watch(&mut tracer, BreakpointRegister::Slot0, true);

        tracer.target.calls.clear();
        tracer.target.spawn_thread(101, 103);

        // DR7 is copied from the parent, but must still be written to arm
        // the breakpoint
        assert_eq!(tracer.target.dr7(103), expected_dr7(0));

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(outcome, AwaitOutcome::TimedOut));

        assert_eq!(tracer.thread_ids(), [100, 101, 103]);
        assert!(
            tracer
                .target
                .calls
                .contains(&Call::WriteDebugRegister(103, CONTROL_REGISTER, expected_dr7(0)))
        );
        assert_eq!(tracer.target.thread(103).debug_regs[0], 0x1000);
        assert_eq!(tracer.target.resumes_of(103), [None]);
    }

    #[test]
    fn event_during_stop_is_reported_later() {
        let mut tracer = attached(&[100, 101]);
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Other(10),
        });

        write_watch(&mut tracer, BreakpointRegister::Slot0, true);

        // programmed, but left stopped
        assert_eq!(tracer.target.dr7(101), expected_dr7(0));
        assert!(tracer.target.resumes_of(101).is_empty());

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(
            outcome,
            AwaitOutcome::Forwarded {
                thread_id: 101,
                signal: Signal::Other(10)
            }
        ));
        assert_eq!(tracer.target.resumes_of(101), [Some(Signal::Other(10))]);

        // the stop signal is consumed silently
        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(outcome, AwaitOutcome::TimedOut));
        assert_eq!(
            tracer.target.resumes_of(101),
            [Some(Signal::Other(10)), None]
        );
    }

    #[test]
    fn unrelated_trap_is_forwarded() {
        let mut tracer = attached(&[100]);
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 100,
            signal: Signal::Trap,
        });

        let outcome = tracer.await_event(SHORT).unwrap();

        assert!(matches!(
            outcome,
            AwaitOutcome::Forwarded {
                thread_id: 100,
                signal: Signal::Trap
            }
        ));
        assert_eq!(tracer.target.resumes_of(100), [Some(Signal::Trap)]);
    }

    #[test]
    fn process_exit() {
        let mut tracer = attached(&[100, 101]);

        tracer.target.push_event(WaitEvent::Exited {
            thread_id: 101,
            status: ExitStatus::Code(0),
        });
        tracer.target.push_event(WaitEvent::Exited {
            thread_id: 100,
            status: ExitStatus::Signal(9),
        });

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(
            outcome,
            AwaitOutcome::ThreadExited {
                thread_id: 101,
                status: ExitStatus::Code(0)
            }
        ));

        let outcome = tracer.await_event(SHORT).unwrap();
        assert!(matches!(
            outcome,
            AwaitOutcome::ProcessExited(ExitStatus::Signal(9))
        ));

        let err = tracer.await_event(SHORT).unwrap_err();
        assert!(matches!(err, Error::NoTracedThreads));
    }

    #[test]
    fn detach_clears_slots() {
        let mut tracer = attached(&[100, 101]);
        write_watch(&mut tracer, BreakpointRegister::Slot2, true);

        // left stopped by the caller
        tracer.target.thread(100).debug_regs[STATUS_REGISTER] = 0b100;
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 100,
            signal: Signal::Trap,
        });
        let AwaitOutcome::Breakpoint(_event) = tracer.await_event(SHORT).unwrap() else {
            panic!("breakpoint not reported");
        };

        tracer.target.calls.clear();
        tracer.detach_all().unwrap();

        for thread_id in [100, 101] {
            assert_eq!(tracer.target.dr7(thread_id), 0);
            assert!(!tracer.target.thread(thread_id).traced);
            assert!(tracer.target.calls.contains(&Call::Detach(thread_id, None)));
        }

        // the trapped thread wasn't stopped again
        assert!(!tracer.target.calls.contains(&Call::RequestStop(100)));
        assert!(tracer.target.calls.contains(&Call::RequestStop(101)));
    }

    #[test]
    fn detach_forwards_signals() {
        let mut tracer = attached(&[100, 101]);
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Other(15),
        });

        tracer.detach_all().unwrap();

        assert_eq!(tracer.target.resumes_of(101), [Some(Signal::Other(15))]);
        assert!(tracer.target.calls.contains(&Call::Detach(101, None)));
        assert!(tracer.thread_ids().is_empty());

        let err = tracer.await_event(SHORT).unwrap_err();
        assert!(matches!(err, Error::NoTracedThreads));
    }

    #[test]
    fn detach_consumes_queued_stop() {
        let mut tracer = attached(&[100, 101]);
        tracer.target.push_event(WaitEvent::Stopped {
            thread_id: 101,
            signal: Signal::Other(10),
        });
        write_watch(&mut tracer, BreakpointRegister::Slot0, true);

        assert!(tracer.target.resumes_of(101).is_empty());

        tracer.detach_all().unwrap();

        // the stashed signal is delivered before the stop signal is reaped
        assert_eq!(tracer.target.resumes_of(101), [Some(Signal::Other(10))]);
        assert!(tracer.target.calls.contains(&Call::Detach(101, None)));
        assert_eq!(tracer.target.dr7(101), 0);
        assert_eq!(tracer.target.queued_events(), 0);
    }

    #[test]
    fn detach_reports_every_failure() {
        let mut tracer = attached(&[100, 101, 102]);
        tracer.target.thread(101).responsive = false;
        tracer.target.thread(102).responsive = false;

        let err = tracer.detach_all().unwrap_err();

        let Error::Detach {
            process_id: 100,
            failures,
        } = &err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(failures.len(), 2);
        assert!(
            failures
                .iter()
                .all(|e| matches!(e, Error::ThreadStopTimeout { .. }))
        );

        // the responsive thread is detached anyway
        assert!(tracer.target.calls.contains(&Call::Detach(100, None)));
        assert!(tracer.thread_ids().is_empty());
    }
}
