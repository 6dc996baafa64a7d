//! BallotQ CLI
//!
//! Command-line tools for a BallotQ delivery queue.
//!
//! # Commands
//!
//! - `cast` - Queue a new record
//! - `list` - List queued records
//! - `inspect` - Display log statistics
//! - `verify` - Verify log integrity and record tags
//! - `compact` - Rewrite the log with live records only
//! - `sweep` - Run one delivery pass
//! - `run` - Deliver periodically until interrupted

mod commands;

use ballotq_core::RecordStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// BallotQ command-line queue tools.
#[derive(Parser)]
#[command(name = "ballotq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue directory
    #[arg(global = true, short, long, env = "BALLOTQ_DIR")]
    dir: Option<PathBuf>,

    /// Secret used to sign and verify records
    #[arg(global = true, long, env = "BALLOTQ_SIGNING_KEY", hide_env_values = true)]
    signing_key: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, sign and queue new records
    Cast {
        /// Number of records to cast
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// List queued records
    List {
        /// Only show records with this status (queued, sending, failed)
        #[arg(short, long)]
        status: Option<RecordStatus>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display log statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log frames and, with a signing key, record tags
    Verify,

    /// Rewrite the log with live records only
    Compact {
        /// Show what would be reclaimed without rewriting
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one delivery pass against an acceptor
    Sweep {
        /// Base URL of the acceptor
        #[arg(short, long, env = "BALLOTQ_ENDPOINT")]
        endpoint: String,

        /// Per-attempt timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Deliver periodically until interrupted
    Run {
        /// Base URL of the acceptor
        #[arg(short, long, env = "BALLOTQ_ENDPOINT")]
        endpoint: String,

        /// Seconds between sweeps
        #[arg(short, long, default_value = "15")]
        period: u64,

        /// Per-attempt timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Cast { count } => {
            let dir = cli.dir.ok_or("Queue directory required for cast")?;
            let key = cli.signing_key.ok_or("Signing key required for cast")?;
            commands::cast::run(&dir, &key, count)?;
        }
        Commands::List { status, format } => {
            let dir = cli.dir.ok_or("Queue directory required for list")?;
            commands::list::run(&dir, status, &format)?;
        }
        Commands::Inspect { format } => {
            let dir = cli.dir.ok_or("Queue directory required for inspect")?;
            commands::inspect::run(&dir, &format)?;
        }
        Commands::Verify => {
            let dir = cli.dir.ok_or("Queue directory required for verify")?;
            commands::verify::run(&dir, cli.signing_key.as_deref())?;
        }
        Commands::Compact { dry_run } => {
            let dir = cli.dir.ok_or("Queue directory required for compact")?;
            commands::compact::run(&dir, dry_run)?;
        }
        Commands::Sweep { endpoint, timeout } => {
            let dir = cli.dir.ok_or("Queue directory required for sweep")?;
            let key = cli.signing_key.ok_or("Signing key required for sweep")?;
            let target = commands::deliver::Target {
                dir: &dir,
                signing_key: &key,
                endpoint: &endpoint,
                attempt_timeout: Duration::from_secs(timeout),
            };
            commands::deliver::sweep(&target).await?;
        }
        Commands::Run {
            endpoint,
            period,
            timeout,
        } => {
            let dir = cli.dir.ok_or("Queue directory required for run")?;
            let key = cli.signing_key.ok_or("Signing key required for run")?;
            let target = commands::deliver::Target {
                dir: &dir,
                signing_key: &key,
                endpoint: &endpoint,
                attempt_timeout: Duration::from_secs(timeout),
            };
            commands::deliver::run(&target, Duration::from_secs(period.max(1))).await?;
        }
        Commands::Version => {
            println!("BallotQ CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BallotQ Core v{}", ballotq_core::VERSION);
        }
    }

    Ok(())
}
