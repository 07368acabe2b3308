//! slotdb CLI
//!
//! Command-line tools for looking into slotdb files.
//!
//! # Commands
//!
//! - `inspect` - Display header, pages, sequences and indexes
//! - `verify` - Check pages and the free list against the header
//! - `dump` - Print stored records, or the raw entries of one page

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// slotdb command-line tools.
#[derive(Parser)]
#[command(name = "slotdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display header, pages, sequences and indexes
    Inspect {
        /// List every page descriptor
        #[arg(long)]
        pages: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check pages and the free list against the header
    Verify,

    /// Print stored records as JSON lines
    Dump {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the raw entries of this page instead
        #[arg(long)]
        page: Option<u32>,
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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { pages, format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, pages, &format).await?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path).await?;
        }
        Commands::Dump { limit, page } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, limit, page).await?;
        }
        Commands::Version => {
            println!("slotdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("slotdb core v{}", slotdb_core::VERSION);
        }
    }

    Ok(())
}
