/// Hardware breakpoint debugger.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to attach to a running process and report hardware breakpoint
    /// hits.
    Watch {
        /// Watchpoint configuration (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file. Otherwise it is directly parsed as inline KDL-formatted
        /// configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Detach after this number of hits.
        #[clap(long)]
        count: Option<u64>,

        /// Detach after this number of seconds.
        #[clap(long, value_name = "SECONDS")]
        duration: Option<u64>,

        /// ID of the process to attach to.
        pid: u64,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
