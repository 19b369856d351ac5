use std::collections::BTreeMap;

/// Registry of the traced threads of a process.
pub struct ThreadManager {
    threads: BTreeMap<u64, ThreadState>,
}

#[derive(Default)]
struct ThreadState {
    /// Whether the thread is stopped and must not be resumed by the tracer
    /// on its own (its stop event belongs to the caller or is queued).
    held: bool,

    /// Whether a stop signal sent to the thread was not observed yet.
    stop_pending: bool,

    /// Whether the thread never received the hardware slot configuration.
    needs_slots: bool,
}

impl ThreadManager {
    pub const fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn contains(&self, thread_id: u64) -> bool {
        self.threads.contains_key(&thread_id)
    }

    /// Returns the IDs of the traced threads, in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.threads.keys().copied().collect()
    }

    /// Registers a thread the tracer attached to.
    ///
    /// Its initial stop is pending.
    pub fn register_attached(&mut self, thread_id: u64) {
        let state = self.threads.entry(thread_id).or_default();
        state.stop_pending = true;
    }

    /// Registers a thread spawned (and automatically traced) by a traced
    /// thread.
    ///
    /// Its initial stop is pending and it has no hardware breakpoint.
    pub fn register_spawned(&mut self, thread_id: u64) {
        self.threads.entry(thread_id).or_insert(ThreadState {
            held: false,
            stop_pending: true,
            needs_slots: true,
        });
    }

    pub fn register_exit(&mut self, thread_id: u64) {
        self.threads.remove(&thread_id);
    }

    pub fn is_held(&self, thread_id: u64) -> bool {
        self.threads.get(&thread_id).is_some_and(|s| s.held)
    }

    pub fn hold(&mut self, thread_id: u64) {
        if let Some(state) = self.threads.get_mut(&thread_id) {
            state.held = true;
        }
    }

    pub fn release(&mut self, thread_id: u64) {
        if let Some(state) = self.threads.get_mut(&thread_id) {
            state.held = false;
        }
    }

    pub fn is_stop_pending(&self, thread_id: u64) -> bool {
        self.threads.get(&thread_id).is_some_and(|s| s.stop_pending)
    }

    pub fn set_stop_pending(&mut self, thread_id: u64, pending: bool) {
        if let Some(state) = self.threads.get_mut(&thread_id) {
            state.stop_pending = pending;
        }
    }

    /// Flags the thread as missing the hardware slot configuration.
    pub fn mark_needs_slots(&mut self, thread_id: u64) {
        if let Some(state) = self.threads.get_mut(&thread_id) {
            state.needs_slots = true;
        }
    }

    /// Returns whether the thread needs the hardware slot configuration,
    /// clearing the flag.
    pub fn take_needs_slots(&mut self, thread_id: u64) -> bool {
        self.threads
            .get_mut(&thread_id)
            .is_some_and(|s| std::mem::take(&mut s.needs_slots))
    }
}
