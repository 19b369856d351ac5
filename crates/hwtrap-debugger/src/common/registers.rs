/// Index of `DR6` among the debug registers.
pub(crate) const STATUS_REGISTER: usize = 6;

/// Index of `DR7` among the debug registers.
pub(crate) const CONTROL_REGISTER: usize = 7;

/// Hardware breakpoint register (`DR0`..`DR3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointRegister {
    /// `DR0`.
    Slot0,

    /// `DR1`.
    Slot1,

    /// `DR2`.
    Slot2,

    /// `DR3`.
    Slot3,

    /// No register. Never a valid programming target.
    Invalid,
}

impl BreakpointRegister {
    /// The four programmable slots, in precedence order.
    pub const SLOTS: [Self; 4] = [Self::Slot0, Self::Slot1, Self::Slot2, Self::Slot3];

    /// Returns the index of the slot, or `None` for [Invalid](Self::Invalid).
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Slot0 => Some(0),
            Self::Slot1 => Some(1),
            Self::Slot2 => Some(2),
            Self::Slot3 => Some(3),
            Self::Invalid => None,
        }
    }

    /// Returns the slot with the given index.
    ///
    /// Out of range indices map to [Invalid](Self::Invalid).
    pub const fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Slot0,
            1 => Self::Slot1,
            2 => Self::Slot2,
            3 => Self::Slot3,
            _ => Self::Invalid,
        }
    }
}

/// Access condition triggering a hardware breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointTrigger {
    /// Instruction execution.
    Execute,

    /// Data write.
    Write,

    /// Data read or write.
    Access,
}

impl BreakpointTrigger {
    /// Returns the `R/W` field encoding of `DR7`.
    pub const fn bits(self) -> u64 {
        match self {
            Self::Execute => 0b00,
            Self::Write => 0b01,
            Self::Access => 0b11,
        }
    }
}

/// Size of the memory range watched by a hardware breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakpointSize {
    /// 1 byte.
    Size1,

    /// 2 bytes.
    Size2,

    /// 4 bytes.
    Size4,

    /// 8 bytes.
    Size8,
}

impl BreakpointSize {
    /// Returns the `LEN` field encoding of `DR7`.
    ///
    /// The encoding isn't ordered by size: `0b10` means 8 bytes and `0b11`
    /// means 4 bytes.
    pub const fn bits(self) -> u64 {
        match self {
            Self::Size1 => 0b00,
            Self::Size2 => 0b01,
            Self::Size8 => 0b10,
            Self::Size4 => 0b11,
        }
    }

    /// Returns the watched size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Size1 => 1,
            Self::Size2 => 2,
            Self::Size4 => 4,
            Self::Size8 => 8,
        }
    }

    /// Returns the size watching the given number of bytes.
    pub const fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::Size1),
            2 => Some(Self::Size2),
            4 => Some(Self::Size4),
            8 => Some(Self::Size8),
            _ => None,
        }
    }
}

/// Debug status register (`DR6`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugStatus(u64);

impl DebugStatus {
    /// `B0`..`B3`.
    const FIRED_MASK: u64 = 0b1111;

    /// Wraps the raw register value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns whether the given slot fired.
    pub const fn fired(self, slot: usize) -> bool {
        slot < 4 && self.0 & (1 << slot) != 0
    }

    /// Returns the slot which fired.
    ///
    /// If several slots are flagged, the lowest one wins. If none is,
    /// [Invalid](BreakpointRegister::Invalid) is returned.
    pub const fn fired_slot(self) -> BreakpointRegister {
        let fired = self.0 & Self::FIRED_MASK;

        if fired == 0 {
            BreakpointRegister::Invalid
        } else {
            BreakpointRegister::from_index(fired.trailing_zeros() as usize)
        }
    }

    /// Returns the register with every slot flag cleared.
    pub const fn with_fired_cleared(self) -> Self {
        Self(self.0 & !Self::FIRED_MASK)
    }
}

/// Debug control register (`DR7`).
///
/// For slot `n`:
/// - bit `2n` is the local enable flag (`Ln`),
/// - bit `2n + 1` is the global enable flag (`Gn`),
/// - bits `16 + 4n` and `17 + 4n` hold the access condition (`R/Wn`),
/// - bits `18 + 4n` and `19 + 4n` hold the length (`LENn`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugControl(u64);

impl DebugControl {
    const LOCAL_ENABLE: u64 = 0b01;
    const ENABLE_MASK: u64 = 0b11;
    const CONDITION_SHIFT: usize = 16;
    const LENGTH_SHIFT: usize = 18;
    const SLOT_FIELDS_WIDTH: usize = 4;
    const FIELD_MASK: u64 = 0b11;

    /// Wraps the raw register value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    const fn enable_shift(slot: usize) -> usize {
        slot * 2
    }

    const fn condition_shift(slot: usize) -> usize {
        Self::CONDITION_SHIFT + slot * Self::SLOT_FIELDS_WIDTH
    }

    const fn length_shift(slot: usize) -> usize {
        Self::LENGTH_SHIFT + slot * Self::SLOT_FIELDS_WIDTH
    }

    /// Returns whether the slot is enabled (locally or globally).
    pub const fn is_enabled(self, slot: usize) -> bool {
        (self.0 >> Self::enable_shift(slot)) & Self::ENABLE_MASK != 0
    }

    /// Returns the raw `R/W` field of the slot.
    pub const fn condition(self, slot: usize) -> u64 {
        (self.0 >> Self::condition_shift(slot)) & Self::FIELD_MASK
    }

    /// Returns the raw `LEN` field of the slot.
    pub const fn length(self, slot: usize) -> u64 {
        (self.0 >> Self::length_shift(slot)) & Self::FIELD_MASK
    }

    /// Returns the register with the slot enabled for the given condition.
    ///
    /// Instruction breakpoints always use the 1-byte length, as required by
    /// the processor.
    pub const fn with_enabled(
        self,
        slot: usize,
        trigger: BreakpointTrigger,
        size: BreakpointSize,
    ) -> Self {
        let length = match trigger {
            BreakpointTrigger::Execute => BreakpointSize::Size1.bits(),
            _ => size.bits(),
        };

        let raw = self.with_disabled(slot).0
            | Self::LOCAL_ENABLE << Self::enable_shift(slot)
            | trigger.bits() << Self::condition_shift(slot)
            | length << Self::length_shift(slot);

        Self(raw)
    }

    /// Returns the register with the slot disabled and its condition cleared.
    pub const fn with_disabled(self, slot: usize) -> Self {
        let mask = Self::ENABLE_MASK << Self::enable_shift(slot)
            | Self::FIELD_MASK << Self::condition_shift(slot)
            | Self::FIELD_MASK << Self::length_shift(slot);

        Self(self.0 & !mask)
    }
}

/// General-purpose register snapshot of a stopped thread.
///
/// The layout is `#[repr(C)]`, one word per register, in a fixed order.
#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Registers {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rip: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// General-purpose register snapshot of a stopped thread.
///
/// The layout is `#[repr(C)]`, one word per register, in a fixed order.
#[cfg(target_arch = "x86")]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Registers {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub edi: u32,
    pub esi: u32,
    pub esp: u32,
    pub ebp: u32,
    pub eip: u32,
}

impl Registers {
    /// Returns the instruction pointer.
    pub const fn instr_addr(&self) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            self.rip
        }
        #[cfg(target_arch = "x86")]
        {
            self.eip as u64
        }
    }

    /// Returns the stack pointer.
    pub const fn stack_addr(&self) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            self.rsp
        }
        #[cfg(target_arch = "x86")]
        {
            self.esp as u64
        }
    }
}
