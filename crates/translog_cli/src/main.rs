//! Translog CLI
//!
//! Command-line tools for translog domains. Every command is read-only: no
//! command takes the domain lock or modifies a segment file, so they are
//! safe to run next to a live domain.
//!
//! # Commands
//!
//! - `inspect` - Display the segments of a domain
//! - `dump` - Print the records in a serial range
//! - `verify` - Verify every block checksum of a domain

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Translog command-line tools.
#[derive(Parser)]
#[command(name = "translog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base directory holding the domain directories
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
    /// Display the segments of a domain
    Inspect {
        /// Domain name
        domain: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of a domain
    Dump {
        /// Domain name
        domain: String,

        /// Print records after this serial
        #[arg(long, default_value = "0")]
        from: u64,

        /// Print records up to and including this serial
        #[arg(long)]
        to: Option<u64>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify the segment files of a domain
    Verify {
        /// Domain name
        domain: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { domain, format } => {
            let path = cli.path.ok_or("Base directory required for inspect")?;
            commands::inspect::run(&path, &domain, &format)?;
        }
        Commands::Dump {
            domain,
            from,
            to,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Base directory required for dump")?;
            commands::dump::run(&path, &domain, from, to.unwrap_or(u64::MAX), limit, &format)?;
        }
        Commands::Verify { domain } => {
            let path = cli.path.ok_or("Base directory required for verify")?;
            commands::verify::run(&path, &domain)?;
        }
        Commands::Version => {
            println!("translog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("translog core v{}", translog_core::VERSION);
        }
    }

    Ok(())
}
