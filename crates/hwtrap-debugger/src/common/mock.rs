//! In-memory [TargetControl] implementation for unit tests.

use std::collections::{BTreeMap, VecDeque};

use super::registers::Registers;
use super::target::{Signal, TargetControl, TargetError, WaitEvent};

/// Recorded side effect on the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Attach(u64),
    TraceClones(u64),
    Detach(u64, Option<Signal>),
    RequestStop(u64),
    Resume(u64, Option<Signal>),
    WriteDebugRegister(u64, usize, u64),
}

pub struct MockThread {
    pub debug_regs: [u64; 8],
    pub registers: Registers,
    pub signal: Option<Signal>,
    pub traced: bool,

    /// Whether the thread honors stop requests.
    pub responsive: bool,

    /// Whether debug register accesses fail.
    pub broken: bool,
}

pub struct MockTarget {
    pub threads: BTreeMap<u64, MockThread>,

    /// Queued events, with the number of polls before they are reported.
    events: VecDeque<(u32, WaitEvent)>,

    pub calls: Vec<Call>,

    /// Whether register reads fail.
    pub fail_reads: bool,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            events: VecDeque::new(),
            calls: Vec::new(),
            fail_reads: false,
        }
    }

    pub fn add_thread(&mut self, thread_id: u64) -> &mut MockThread {
        self.threads.entry(thread_id).or_insert(MockThread {
            debug_regs: [0; 8],
            registers: Registers::default(),
            signal: None,
            traced: false,
            responsive: true,
            broken: false,
        })
    }

    pub fn thread(&mut self, thread_id: u64) -> &mut MockThread {
        self.add_thread(thread_id)
    }

    /// Simulates a traced thread spawning another one.
    ///
    /// Like Linux, the new thread starts with the `DR7` value of its parent.
    pub fn spawn_thread(&mut self, thread_id: u64, new_thread_id: u64) {
        let control = self.dr7(thread_id);

        let thread = self.add_thread(new_thread_id);
        thread.traced = true;
        thread.debug_regs[7] = control;

        self.push_event(WaitEvent::Cloned {
            thread_id,
            new_thread_id,
        });
        self.push_event(WaitEvent::Stopped {
            thread_id: new_thread_id,
            signal: Signal::Stop,
        });
    }

    pub fn push_event(&mut self, event: WaitEvent) {
        self.events.push_back((0, event));
    }

    pub fn push_delayed_event(&mut self, polls: u32, event: WaitEvent) {
        self.events.push_back((polls, event));
    }

    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    pub fn dr7(&self, thread_id: u64) -> u64 {
        self.threads.get(&thread_id).map_or(0, |t| t.debug_regs[7])
    }

    pub fn register_writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::WriteDebugRegister(..)))
            .count()
    }

    pub fn resumes_of(&self, thread_id: u64) -> Vec<Option<Signal>> {
        self.calls
            .iter()
            .filter_map(|c| match *c {
                Call::Resume(id, signal) if id == thread_id => Some(signal),
                _ => None,
            })
            .collect()
    }

    fn get(&self, thread_id: u64) -> Result<&MockThread, TargetError> {
        self.threads.get(&thread_id).ok_or(TargetError::Gone)
    }

    fn read_error() -> TargetError {
        TargetError::Os(std::io::Error::from_raw_os_error(5))
    }
}

impl TargetControl for MockTarget {
    fn attach(&mut self, thread_id: u64) -> Result<(), TargetError> {
        self.calls.push(Call::Attach(thread_id));

        let thread = self.threads.get_mut(&thread_id).ok_or(TargetError::Gone)?;
        if thread.traced {
            return Err(TargetError::NotPermitted);
        }
        thread.traced = true;

        if thread.responsive {
            self.push_event(WaitEvent::Stopped {
                thread_id,
                signal: Signal::Stop,
            });
        }

        Ok(())
    }

    fn trace_clones(&mut self, thread_id: u64) -> Result<(), TargetError> {
        self.calls.push(Call::TraceClones(thread_id));
        self.get(thread_id).map(drop)
    }

    fn detach(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError> {
        self.calls.push(Call::Detach(thread_id, signal));

        let thread = self.threads.get_mut(&thread_id).ok_or(TargetError::Gone)?;
        thread.traced = false;

        Ok(())
    }

    fn list_threads(&self, _process_id: u64) -> Result<Vec<u64>, TargetError> {
        Ok(self.threads.keys().copied().collect())
    }

    fn try_wait(&mut self, thread_id: Option<u64>) -> Result<Option<WaitEvent>, TargetError> {
        let Some(pos) = self
            .events
            .iter()
            .position(|(_, e)| thread_id.is_none_or(|id| e.thread_id() == id))
        else {
            return Ok(None);
        };

        if let Some((polls, _)) = self.events.get_mut(pos).filter(|(polls, _)| *polls > 0) {
            *polls -= 1;
            return Ok(None);
        }

        let Some((_, event)) = self.events.remove(pos) else {
            return Ok(None);
        };

        let signal = match event {
            WaitEvent::Stopped { signal, .. } => Some(signal),
            WaitEvent::Cloned { .. } | WaitEvent::Event { .. } => Some(Signal::Trap),
            WaitEvent::Exited { thread_id, .. } => {
                self.threads.remove(&thread_id);
                None
            }
        };

        if let Some(thread) = self.threads.get_mut(&event.thread_id()) {
            thread.signal = signal;
        }

        Ok(Some(event))
    }

    fn request_stop(&mut self, _process_id: u64, thread_id: u64) -> Result<(), TargetError> {
        self.calls.push(Call::RequestStop(thread_id));

        if self.get(thread_id)?.responsive {
            self.push_event(WaitEvent::Stopped {
                thread_id,
                signal: Signal::Stop,
            });
        }

        Ok(())
    }

    fn pending_signal(&self, thread_id: u64) -> Result<Signal, TargetError> {
        self.get(thread_id)?.signal.ok_or(TargetError::Gone)
    }

    fn resume(&mut self, thread_id: u64, signal: Option<Signal>) -> Result<(), TargetError> {
        self.calls.push(Call::Resume(thread_id, signal));

        let thread = self.threads.get_mut(&thread_id).ok_or(TargetError::Gone)?;
        thread.signal = None;

        Ok(())
    }

    fn read_debug_register(&self, thread_id: u64, index: usize) -> Result<u64, TargetError> {
        let thread = self.get(thread_id)?;
        if self.fail_reads || thread.broken {
            return Err(Self::read_error());
        }

        Ok(thread.debug_regs[index])
    }

    fn write_debug_register(
        &mut self,
        thread_id: u64,
        index: usize,
        value: u64,
    ) -> Result<(), TargetError> {
        self.calls
            .push(Call::WriteDebugRegister(thread_id, index, value));

        let thread = self.threads.get_mut(&thread_id).ok_or(TargetError::Gone)?;
        if thread.broken {
            return Err(Self::read_error());
        }
        thread.debug_regs[index] = value;

        Ok(())
    }

    fn read_registers(&self, thread_id: u64) -> Result<Registers, TargetError> {
        if self.fail_reads {
            return Err(Self::read_error());
        }

        Ok(self.get(thread_id)?.registers)
    }
}
