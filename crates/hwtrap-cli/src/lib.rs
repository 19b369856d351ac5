//! Crate implementing the CLI commands.

mod cli;
mod config;
mod run;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{
    Address, ConfigError, RetryConfig, Trigger, WatchConfig, WatchSpec, Watchpoint,
};
pub use self::run::{WatchLimits, evaluate_watch};
