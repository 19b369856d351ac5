#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use std::time::Duration;

use hwtrap_cli::{CliAction, CliOpts, WatchLimits};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("HWTRAP_LOG")
                .from_env_lossy(),
        )
        .init();

    let res = match cli.action {
        CliAction::Watch {
            config,
            count,
            duration,
            pid,
        } => {
            let limits = WatchLimits {
                count,
                duration: duration.map(Duration::from_secs),
            };

            hwtrap_cli::evaluate_watch(config, limits, pid)
        }
    };

    if let Err(e) = res {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
