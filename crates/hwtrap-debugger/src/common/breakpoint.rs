use super::registers::{BreakpointSize, BreakpointTrigger, CONTROL_REGISTER, DebugControl};
use super::target::{TargetControl, TargetError};

/// Hardware breakpoint programmed into a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watchpoint {
    pub address: u64,
    pub trigger: BreakpointTrigger,
    pub size: BreakpointSize,
}

/// Desired configuration of the four hardware breakpoint slots.
///
/// Debug registers aren't inherited by spawned threads, so the table is the
/// reference used to program new threads.
#[derive(Clone, Debug, Default)]
pub struct HardwareSlots([Option<Watchpoint>; 4]);

impl HardwareSlots {
    pub fn get(&self, index: usize) -> Option<Watchpoint> {
        self.0.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, watchpoint: Option<Watchpoint>) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = watchpoint;
        }
    }

    /// Programs a single slot into a stopped thread.
    ///
    /// Disabling a slot only updates `DR7`, its address register is kept.
    pub fn apply<T: TargetControl>(
        &self,
        target: &mut T,
        thread_id: u64,
        index: usize,
    ) -> Result<(), TargetError> {
        let control = DebugControl::new(target.read_debug_register(thread_id, CONTROL_REGISTER)?);

        let control = self.program(target, thread_id, index, control)?;

        target.write_debug_register(thread_id, CONTROL_REGISTER, control.raw())
    }

    /// Programs every slot into a stopped thread.
    ///
    /// `DR7` is always written: a cloned thread inherits the `DR7` value of
    /// its parent, but not the breakpoints it describes.
    pub fn replay<T: TargetControl>(
        &self,
        target: &mut T,
        thread_id: u64,
    ) -> Result<(), TargetError> {
        let mut control =
            DebugControl::new(target.read_debug_register(thread_id, CONTROL_REGISTER)?);

        for index in 0..self.0.len() {
            control = self.program(target, thread_id, index, control)?;
        }

        target.write_debug_register(thread_id, CONTROL_REGISTER, control.raw())
    }

    /// Disables every slot of a stopped thread.
    pub fn clear<T: TargetControl>(target: &mut T, thread_id: u64) -> Result<(), TargetError> {
        let initial = DebugControl::new(target.read_debug_register(thread_id, CONTROL_REGISTER)?);

        let control = (0..4).fold(initial, |control, index| control.with_disabled(index));

        if control != initial {
            target.write_debug_register(thread_id, CONTROL_REGISTER, control.raw())?;
        }

        Ok(())
    }

    /// Writes the address register of a slot if it is enabled, and returns
    /// the updated `DR7` value.
    fn program<T: TargetControl>(
        &self,
        target: &mut T,
        thread_id: u64,
        index: usize,
        control: DebugControl,
    ) -> Result<DebugControl, TargetError> {
        let Some(watchpoint) = self.get(index) else {
            return Ok(control.with_disabled(index));
        };

        target.write_debug_register(thread_id, index, watchpoint.address)?;

        Ok(control.with_enabled(index, watchpoint.trigger, watchpoint.size))
    }
}
