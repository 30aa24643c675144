//! forkpool - run shell commands in parallel across forked workers.

mod cli;
mod output;
mod run;

use anyhow::Result;
use clap::Parser;
use forkpool::logging::{self, LogConfig};
use forkpool::map::MapOptions;
use forkpool::{cpus, pool};
use owo_colors::{OwoColorize, Stream::Stderr};
use std::io::IsTerminal;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);
    pool::set_capture_traces(cli.trace);

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(&cli, args),
        Commands::Cpus(args) => cmd_cpus(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Configure tracing from -v/-q, --log-format and the FORKPOOL_LOG* variables.
fn init_logging(cli: &Cli) {
    let mut config = if cli.quiet {
        LogConfig::new()
            .with_level(tracing::Level::ERROR)
            .with_filter("error".to_string())
    } else {
        LogConfig::for_cli(cli.verbose)
    }
    .with_env_overrides();

    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    logging::init(config);
}

/// Run shell commands through the map layer and print their reports.
fn cmd_run(cli: &Cli, args: &cli::RunArgs) -> Result<()> {
    let commands = if args.commands.is_empty() {
        let stdin = std::io::stdin();
        if stdin.is_terminal() && !cli.quiet {
            eprintln!("Reading commands from stdin, one per line (Ctrl-D to finish)");
        }
        run::read_commands(stdin.lock())?
    } else {
        args.commands.clone()
    };

    if commands.is_empty() {
        tracing::info!("No commands to run");
        return Ok(());
    }

    // map falls back to FORKPOOL_TMPDIR
    let options = MapOptions {
        max_procs: args.jobs,
        fail_fast: args.fail_fast,
        transport_dir: None,
    };
    tracing::info!(
        commands = commands.len(),
        max_procs = options.max_procs.unwrap_or_else(cpus::default_procs),
        fail_fast = options.fail_fast,
        "Running commands"
    );

    let reports = run::run_commands(commands, &args.shell, &options)?;

    let format = match args.format {
        cli::OutputFormatArg::Plain => output::OutputFormat::Plain,
        cli::OutputFormatArg::Json => output::OutputFormat::Json,
    };
    output::print_reports(&reports, format);
    Ok(())
}

/// Print the default worker count.
fn cmd_cpus(args: &cli::CpusArgs) -> Result<()> {
    let count = cpus::configure_default_procs(None, args.redetect);
    println!("{}", count);
    Ok(())
}
