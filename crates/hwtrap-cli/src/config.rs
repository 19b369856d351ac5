use std::str::FromStr;
use std::time::Duration;

use hwtrap_debugger::{
    BreakpointRegister, BreakpointSize, BreakpointTrigger, RetryPolicy, TracerConfig,
};

/// Invalid watchpoint configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Only slots 0 to 3 exist.
    #[error("invalid slot {0} (expected 0 to 3)")]
    InvalidSlot(u8),

    /// Only 1, 2, 4 and 8 bytes can be watched.
    #[error("invalid size {0} (expected 1, 2, 4 or 8)")]
    InvalidSize(u8),

    /// A slot is configured twice.
    #[error("slot {0} configured more than once")]
    DuplicateSlot(u8),

    /// The address isn't a (hexadecimal) integer.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
}

/// Configuration of a watch session.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct WatchConfig {
    /// Maximum time in milliseconds to wait for a thread to stop after
    /// attaching.
    #[knus(child, default = 5000, unwrap(argument))]
    pub attach_timeout_ms: u64,

    /// Policy for stopping threads before programming them.
    #[knus(child)]
    pub stop_retry: Option<RetryConfig>,

    /// Hardware breakpoints to program.
    #[knus(children(name = "watch"))]
    pub watches: Vec<WatchSpec>,
}

/// Configuration of the thread stop policy.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct RetryConfig {
    /// Maximum number of stop requests per thread.
    #[knus(property, default = 10)]
    pub attempts: u32,

    /// Time in milliseconds given to a thread after the first request.
    #[knus(property, default = 10)]
    pub initial_wait_ms: u64,

    /// Maximum time in milliseconds given to a thread after any request.
    #[knus(property, default = 100)]
    pub max_wait_ms: u64,
}

/// Configuration of a hardware breakpoint.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct WatchSpec {
    /// Watched address.
    #[knus(argument, str)]
    pub address: Address,

    /// Hardware slot (0 to 3).
    #[knus(property)]
    pub slot: u8,

    /// Access condition.
    #[knus(property, default = Trigger::Write)]
    pub trigger: Trigger,

    /// Watched size in bytes (ignored for execution).
    #[knus(property, default = 1)]
    pub size: u8,
}

/// Access condition of a hardware breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, knus::DecodeScalar)]
pub enum Trigger {
    /// Instruction execution.
    Execute,

    /// Data write.
    Write,

    /// Data read or write.
    Access,
}

/// Memory address, hexadecimal (`0x` prefix) or decimal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address(pub u64);

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
            None => s.replace('_', "").parse(),
        };

        parsed
            .map(Self)
            .map_err(|_| ConfigError::InvalidAddress(s.to_owned()))
    }
}

impl From<Trigger> for BreakpointTrigger {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Execute => Self::Execute,
            Trigger::Write => Self::Write,
            Trigger::Access => Self::Access,
        }
    }
}

/// Hardware breakpoint, checked and ready to be programmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watchpoint {
    /// Watched address.
    pub address: u64,

    /// Hardware slot.
    pub slot: BreakpointRegister,

    /// Access condition.
    pub trigger: BreakpointTrigger,

    /// Watched size.
    pub size: BreakpointSize,
}

impl WatchSpec {
    /// Checks the slot and size of the breakpoint.
    pub fn watchpoint(&self) -> Result<Watchpoint, ConfigError> {
        let slot = BreakpointRegister::from_index(self.slot as usize);
        if slot == BreakpointRegister::Invalid {
            return Err(ConfigError::InvalidSlot(self.slot));
        }

        let size = match self.trigger {
            Trigger::Execute => BreakpointSize::Size1,
            _ => BreakpointSize::from_bytes(self.size as usize)
                .ok_or(ConfigError::InvalidSize(self.size))?,
        };

        Ok(Watchpoint {
            address: self.address.0,
            slot,
            trigger: self.trigger.into(),
            size,
        })
    }
}

impl WatchConfig {
    /// Returns the checked hardware breakpoints.
    pub fn watchpoints(&self) -> Result<Vec<Watchpoint>, ConfigError> {
        let mut used = [false; 4];

        self.watches
            .iter()
            .map(|spec| {
                let watchpoint = spec.watchpoint()?;

                if let Some(used) = used.get_mut(spec.slot as usize) {
                    if std::mem::replace(used, true) {
                        return Err(ConfigError::DuplicateSlot(spec.slot));
                    }
                }

                Ok(watchpoint)
            })
            .collect()
    }

    /// Returns the configuration of the tracer.
    pub fn tracer_config(&self) -> TracerConfig {
        let mut config = TracerConfig {
            attach_timeout: Duration::from_millis(self.attach_timeout_ms),
            ..TracerConfig::default()
        };

        if let Some(retry) = &self.stop_retry {
            config.stop_retry = RetryPolicy {
                max_attempts: retry.attempts,
                initial_wait: Duration::from_millis(retry.initial_wait_ms),
                max_wait: Duration::from_millis(retry.max_wait_ms),
            };
        }

        config
    }
}
