use hwtrap_debugger::{
    BreakpointRegister, BreakpointSize, BreakpointTrigger, ContinueDecision, Registers,
};

/// A raw value doesn't match any variant of a C enum.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid {name} value: {value}")]
pub struct InvalidEnumValue {
    /// Name of the C enum.
    pub name: &'static str,

    /// Raw value.
    pub value: i32,
}

macro_rules! c_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl TryFrom<i32> for $name {
            type Error = InvalidEnumValue;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    value => Err(InvalidEnumValue {
                        name: stringify!($name),
                        value,
                    }),
                }
            }
        }
    };
}

c_enum! {
    /// Hardware breakpoint register.
    pub enum HardwareBreakpointRegister {
        /// No register.
        InvalidRegister = 0,
        /// `DR0`.
        Dr0 = 1,
        /// `DR1`.
        Dr1 = 2,
        /// `DR2`.
        Dr2 = 3,
        /// `DR3`.
        Dr3 = 4,
    }
}

c_enum! {
    /// Access condition of a hardware breakpoint.
    pub enum HardwareBreakpointTrigger {
        /// Instruction execution.
        Execute = 0,
        /// Data read or write.
        Access = 1,
        /// Data write.
        Write = 2,
    }
}

c_enum! {
    /// Size of the range watched by a hardware breakpoint.
    pub enum HardwareBreakpointSize {
        /// 1 byte.
        Size1 = 1,
        /// 2 bytes.
        Size2 = 2,
        /// 4 bytes.
        Size4 = 4,
        /// 8 bytes.
        Size8 = 8,
    }
}

c_enum! {
    /// Caller's verdict on a debug event.
    pub enum DebugContinueStatus {
        /// The trap signal is suppressed.
        Handled = 0,
        /// The trap signal is delivered.
        NotHandled = 1,
    }
}

impl From<HardwareBreakpointRegister> for BreakpointRegister {
    fn from(reg: HardwareBreakpointRegister) -> Self {
        match reg {
            HardwareBreakpointRegister::InvalidRegister => Self::Invalid,
            HardwareBreakpointRegister::Dr0 => Self::Slot0,
            HardwareBreakpointRegister::Dr1 => Self::Slot1,
            HardwareBreakpointRegister::Dr2 => Self::Slot2,
            HardwareBreakpointRegister::Dr3 => Self::Slot3,
        }
    }
}

impl From<BreakpointRegister> for HardwareBreakpointRegister {
    fn from(reg: BreakpointRegister) -> Self {
        match reg {
            BreakpointRegister::Invalid => Self::InvalidRegister,
            BreakpointRegister::Slot0 => Self::Dr0,
            BreakpointRegister::Slot1 => Self::Dr1,
            BreakpointRegister::Slot2 => Self::Dr2,
            BreakpointRegister::Slot3 => Self::Dr3,
        }
    }
}

impl From<HardwareBreakpointTrigger> for BreakpointTrigger {
    fn from(trigger: HardwareBreakpointTrigger) -> Self {
        match trigger {
            HardwareBreakpointTrigger::Execute => Self::Execute,
            HardwareBreakpointTrigger::Access => Self::Access,
            HardwareBreakpointTrigger::Write => Self::Write,
        }
    }
}

impl From<HardwareBreakpointSize> for BreakpointSize {
    fn from(size: HardwareBreakpointSize) -> Self {
        match size {
            HardwareBreakpointSize::Size1 => Self::Size1,
            HardwareBreakpointSize::Size2 => Self::Size2,
            HardwareBreakpointSize::Size4 => Self::Size4,
            HardwareBreakpointSize::Size8 => Self::Size8,
        }
    }
}

impl From<DebugContinueStatus> for ContinueDecision {
    fn from(status: DebugContinueStatus) -> Self {
        match status {
            DebugContinueStatus::Handled => Self::Handled,
            DebugContinueStatus::NotHandled => Self::NotHandled,
        }
    }
}

/// Trap information of a [DebugEvent].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ExceptionInfo {
    /// Raw [HardwareBreakpointRegister] which fired.
    pub caused_by: i32,

    /// Register state of the thread, one pointer-sized word per register.
    pub registers: Registers,
}

/// Debug event shared with C callers.
///
/// Enum fields hold raw discriminants, since C callers may write any value.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugEvent {
    /// Raw [DebugContinueStatus], set by the caller before handing the event
    /// back.
    pub continue_status: i32,

    /// ID of the thread which trapped.
    pub thread_id: usize,

    /// Trap information.
    pub exception_info: ExceptionInfo,
}

impl DebugEvent {
    /// Builds the C representation of a debug event.
    pub fn new(event: &hwtrap_debugger::DebugEvent) -> Self {
        let exception = event.exception();

        Self {
            continue_status: DebugContinueStatus::Handled as i32,
            thread_id: event.thread_id() as usize,
            exception_info: ExceptionInfo {
                caused_by: HardwareBreakpointRegister::from(exception.caused_by) as i32,
                registers: exception.registers,
            },
        }
    }
}
