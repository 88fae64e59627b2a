// ============================================================================
// connstat - Main Entry Point
// ============================================================================
//
// Takes one snapshot of the kernel connection tables, counts connections by
// protocol and state and prints the result as JSON on stdout.
//
// Sources:
// - proc (default): decode /proc/net/{tcp,tcp6,udp,udp6} directly
// - netstat: run netstat and decode its tabular output
//
// Diagnostics go to stderr through tracing so stdout only carries JSON.
//
// ============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use connstat::{
    CountMatrix, DEFAULT_PROC_ROOT, NETSTAT_PROGRAM, count_connections, decode_proc_tables,
    parse_netstat_output, read_proc_tables, run_netstat, validate_json,
};

#[derive(Parser)]
#[command(name = "connstat")]
#[command(author, version, about = "Count TCP/UDP connections by protocol and state")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the kernel tables below a proc directory (default)
    Proc {
        /// Path of the proc directory; only worth changing for testing
        #[arg(value_name = "PATH", default_value = DEFAULT_PROC_ROOT)]
        path: PathBuf,
    },

    /// Run netstat and parse its output
    Netstat {
        /// Program to run instead of netstat
        #[arg(long, default_value = NETSTAT_PROGRAM)]
        program: String,
    },

    /// Check that a report read from stdin has the expected shape
    Validate,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Packed-table path: read, decode, count
fn snapshot_from_proc(path: &std::path::Path) -> Result<CountMatrix> {
    let tables = read_proc_tables(path)
        .with_context(|| format!("reading connection tables below {}", path.display()))?;
    let records = decode_proc_tables(&tables).context("decoding /proc/net tables")?;
    Ok(count_connections(&records))
}

/// Tabular path: run, parse, count
fn snapshot_from_netstat(program: &str) -> Result<CountMatrix> {
    let output = run_netstat(program)?;
    let rows = parse_netstat_output(&output).context("parsing netstat output")?;
    Ok(count_connections(&rows))
}

fn print_matrix(matrix: &CountMatrix, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(matrix)?
    } else {
        serde_json::to_string_pretty(matrix)?
    };
    println!("{json}");
    Ok(())
}

/// Returns whether the report on stdin is valid
fn validate_stdin() -> Result<bool> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading report from stdin")?;

    match validate_json(&input) {
        Ok(()) => Ok(true),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Error: Given data is malformed, data:");
            eprintln!("{input}");
            Ok(false)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let command = cli.command.unwrap_or(Commands::Proc {
        path: PathBuf::from(DEFAULT_PROC_ROOT),
    });

    let matrix = match command {
        Commands::Proc { path } => snapshot_from_proc(&path)?,
        Commands::Netstat { program } => snapshot_from_netstat(&program)?,
        Commands::Validate => return validate_stdin(),
    };

    print_matrix(&matrix, cli.compact)?;
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
