//! Oomgen - Deliberate Out-of-Memory Generator
//!
//! This is the selector binary: it picks exactly one exhaustion generator,
//! wires up cancellation and the report sink, and hands control to the
//! generator's run loop. Attach a profiler before (or right after) starting.

use clap::{Parser, Subcommand};
use oomgen::{
    error::Result, probe_metadata_region, HeapExhaustionGenerator, HeapRegionMonitor,
    MetadataExhaustionGenerator, RunExit,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::{self, EnvFilter};

/// Fixed tuning for runs started from the interactive menu
const DEFAULT_UNRECOVERABLE_BYTES: usize = 10240;
const DEFAULT_RECOVERABLE_BYTES: usize = 20480;
const DEFAULT_HEAP_REPORT_PERIOD: usize = 2000;
const DEFAULT_RECOVER_PERIOD: usize = 1000;
const DEFAULT_METADATA_REPORT_PERIOD: usize = 100;

#[derive(Parser)]
#[command(name = "oomgen")]
#[command(about = "Deliberate out-of-memory generator for profiling heap and metadata region exhaustion", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Exhaust the heap region with paced paired allocations
    Heap {
        /// Permanently retained bytes allocated per tick
        #[arg(long, default_value_t = DEFAULT_UNRECOVERABLE_BYTES)]
        unrecoverable_bytes: usize,

        /// Reclaimable bytes allocated per tick
        #[arg(long, default_value_t = DEFAULT_RECOVERABLE_BYTES)]
        recoverable_bytes: usize,

        /// Ticks between status reports (0 disables reporting)
        #[arg(long, default_value_t = DEFAULT_HEAP_REPORT_PERIOD)]
        report_period: usize,

        /// Ticks between recovery sweeps (0 disables recovery)
        #[arg(long, default_value_t = DEFAULT_RECOVER_PERIOD)]
        recover_period: usize,
    },

    /// Exhaust the metadata region with unpaced code unit definitions
    Metadata {
        /// Ticks between status reports (0 disables reporting)
        #[arg(long, default_value_t = DEFAULT_METADATA_REPORT_PERIOD)]
        report_period: usize,

        /// Path to the payload blob defining one code unit
        /// (a bundled default is materialized when omitted)
        #[arg(long)]
        payload: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!("oomgen={}", level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, status reports go to stdout
        .init();

    debug!("oomgen v{} starting...", env!("CARGO_PKG_VERSION"));

    let command = match cli.command {
        Some(command) => command,
        None => prompt_for_generator()?,
    };

    match command {
        Commands::Heap {
            unrecoverable_bytes,
            recoverable_bytes,
            report_period,
            recover_period,
        } => {
            run_heap(
                unrecoverable_bytes,
                recoverable_bytes,
                report_period,
                recover_period,
            )
            .await
        }
        Commands::Metadata {
            report_period,
            payload,
        } => run_metadata(report_period, payload),
    }
}

/// Thin stdin menu: pick a generator when no subcommand was given
fn prompt_for_generator() -> Result<Commands> {
    println!("If you wish to use a profiler, attach it to this process now");
    println!(
        "Input 'm' to start exhausting the metadata region \
         or 'h' to start exhausting the heap region: [m]"
    );

    loop {
        print!("oomgen> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        match input.trim() {
            "h" => {
                return Ok(Commands::Heap {
                    unrecoverable_bytes: DEFAULT_UNRECOVERABLE_BYTES,
                    recoverable_bytes: DEFAULT_RECOVERABLE_BYTES,
                    report_period: DEFAULT_HEAP_REPORT_PERIOD,
                    recover_period: DEFAULT_RECOVER_PERIOD,
                })
            }
            // Empty input (plain Enter, or EOF) takes the default
            "m" | "" => {
                return Ok(Commands::Metadata {
                    report_period: DEFAULT_METADATA_REPORT_PERIOD,
                    payload: None,
                });
            }
            _ => continue,
        }
    }
}

async fn run_heap(
    unrecoverable_bytes: usize,
    recoverable_bytes: usize,
    report_period: usize,
    recover_period: usize,
) -> Result<()> {
    let cancel = CancellationToken::new();

    // Ctrl-C is the external cancellation signal, observed by the generator
    // only at its pacing suspension point
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, requesting clean stop");
            token.cancel();
        }
    });

    println!("Overfilling the heap region:");
    let mut generator = HeapExhaustionGenerator::new(
        unrecoverable_bytes,
        recoverable_bytes,
        report_period,
        recover_period,
        io::stdout(),
        HeapRegionMonitor::new(),
        cancel,
    );

    match generator.run().await {
        RunExit::Cancelled => Ok(()),
        RunExit::Fatal(e) => Err(e),
    }
}

fn run_metadata(report_period: usize, payload: Option<PathBuf>) -> Result<()> {
    let payload_path = match payload {
        Some(path) => path,
        None => materialize_default_payload()?,
    };

    println!("Overfilling the metadata region:");
    let monitor = probe_metadata_region();
    let mut generator =
        MetadataExhaustionGenerator::new(report_period, io::stdout(), payload_path, monitor);

    match generator.run() {
        RunExit::Cancelled => Ok(()),
        RunExit::Fatal(e) => Err(e),
    }
}

/// Write the bundled default payload blob to the temp dir and return its path
fn materialize_default_payload() -> Result<PathBuf> {
    let path = std::env::temp_dir().join("oomgen-payload.bin");
    let bytes: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &bytes)?;
    debug!(path = %path.display(), "materialized default payload blob");
    Ok(path)
}
