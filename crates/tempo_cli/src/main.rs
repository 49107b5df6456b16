//! Tempo CLI: the command-line front end for the tempo simulator.
//!
//! Provides `tempo check` to validate a `tempo.toml`, `tempo clocks` to list
//! the first clock events of the configured clock set, and `tempo run` to
//! drive the configured APB self-check bench.

#![warn(missing_docs)]

mod bench;
mod check;
mod clocks;
mod project;
mod run;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Tempo: clocked simulation with suspendable testbench tasks.
#[derive(Parser, Debug)]
#[command(name = "tempo", version, about = "Tempo clocked simulation engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `tempo.toml` file or the directory containing it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the project configuration.
    Check,
    /// Print the first clock events of the configured clocks.
    Clocks(ClocksArgs),
    /// Run the APB self-check bench.
    Run(RunArgs),
}

/// Arguments for the `tempo clocks` subcommand.
#[derive(Parser, Debug)]
pub struct ClocksArgs {
    /// Number of ticks to print.
    #[arg(short, long, default_value_t = 10)]
    pub edges: u64,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `tempo run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Output path for the VCD trace, overriding `simulation.trace`.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Disable trace recording.
    #[arg(long)]
    pub no_trace: bool,

    /// Output format for the run summary.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Check => check::run(&global),
        Command::Clocks(ref args) => clocks::run(args, &global),
        Command::Run(ref args) => run::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the `tracing` subscriber. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(quiet, verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_level(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_check() {
        let cli = Cli::parse_from(["tempo", "check"]);
        assert!(matches!(cli.command, Command::Check));
        assert!(!cli.quiet);
    }

    #[test]
    fn parse_clocks_edges() {
        let cli = Cli::parse_from(["tempo", "clocks", "--edges", "25", "--format", "json"]);
        match cli.command {
            Command::Clocks(args) => {
                assert_eq!(args.edges, 25);
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Clocks command"),
        }
    }

    #[test]
    fn parse_clocks_default_edges() {
        let cli = Cli::parse_from(["tempo", "clocks"]);
        match cli.command {
            Command::Clocks(args) => assert_eq!(args.edges, 10),
            _ => panic!("expected Clocks command"),
        }
    }

    #[test]
    fn parse_run_with_globals() {
        let cli = Cli::parse_from([
            "tempo", "-v", "--config", "bench/tempo.toml", "run", "-o", "out.vcd.gz",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("bench/tempo.toml"));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.output.as_deref(), Some("out.vcd.gz"));
                assert!(!args.no_trace);
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn log_levels_follow_flags() {
        assert_eq!(default_level(true, true), "error");
        assert_eq!(default_level(false, true), "debug");
        assert_eq!(default_level(false, false), "warn");
    }
}
