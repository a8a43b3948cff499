//! DocSync CLI — replay recorded write scenarios through the change streams.
//!
//! # Commands
//! ```text
//! docsync replay --file <scenario.json> [--view snapshot|state|audit|values|changes]
//!                [--kinds added,removed] [--json]
//! docsync info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cmd_replay;

use cmd_replay::View;

#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Ordered change-stream reconciliation — DocSync CLI",
    long_about = "
DocSync CLI: replay a recorded write scenario against an in-memory collection
and print what each change stream emits after every tick.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter (overrides --verbose), e.g. docsync_stream=debug
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print stream emissions tick by tick
    Replay {
        /// Path to the scenario JSON file
        #[arg(short, long)]
        file: PathBuf,
        /// Which stream to print
        #[arg(long, value_enum, default_value_t = View::Snapshot)]
        view: View,
        /// Comma-separated change kinds to include (default: all)
        #[arg(long)]
        kinds: Option<String>,
        /// Output one JSON object per emission
        #[arg(long)]
        json: bool,
    },

    /// Show DocSync build and capability info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Replay {
            file,
            view,
            kinds,
            json,
        } => cmd_replay::run(&file, view, kinds.as_deref(), json).await,

        Commands::Info => cmd_info(),
    }
}

/// Logs go to stderr so stream output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn cmd_info() -> Result<()> {
    println!("DocSync v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Streams:");
    println!("  snapshot   full collection in query order after every change");
    println!("  state      change batches as they occur (filterable by kind)");
    println!("  audit      every change batch so far, accumulated");
    println!("  values     document data in query order");
    println!("  changes    raw classified batches, unfiltered");
    println!();
    println!("Change kinds:  added, modified, removed");
    println!("Listen modes:  continuous, one-shot");
    println!("Backends:      in-memory (query-ordered, atomic batches)");
    Ok(())
}
