//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use forkpool::logging::LogFormat;

/// Run shell commands in parallel, one forked worker per command.
#[derive(Parser, Debug)]
#[command(name = "forkpool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    /// Log output format.
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Include backtraces in synthesized worker error reports.
    #[arg(long, env = "FORKPOOL_TRACE", global = true)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run shell commands in parallel and print their output in input order.
    Run(RunArgs),

    /// Print the default worker count.
    Cpus(CpusArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Commands to run. Read from stdin, one per line, when none are given.
    pub commands: Vec<String>,

    /// Maximum number of commands running at once (default: core count).
    #[arg(short, long, env = "FORKPOOL_MAX_PROCS")]
    pub jobs: Option<usize>,

    /// Kill running commands as soon as one fails.
    #[arg(long)]
    pub fail_fast: bool,

    /// Shell used to run each command.
    #[arg(long, default_value = "sh")]
    pub shell: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Plain)]
    pub format: OutputFormatArg,
}

/// Arguments for the cpus command.
#[derive(Parser, Debug)]
pub struct CpusArgs {
    /// Probe the host again instead of using the cached count.
    #[arg(long)]
    pub redetect: bool,
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormatArg {
    /// Each command's stdout, in input order.
    #[default]
    Plain,
    /// JSON array of command reports.
    Json,
}

/// Log format argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
