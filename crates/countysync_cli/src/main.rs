//! CountySync CLI
//!
//! Command-line tools for running and inspecting parcel syncs.
//!
//! # Commands
//!
//! - `run` - Sync an input batch into the output directory
//! - `history` - Show recent sync runs from the audit log
//! - `verify` - Check store and snapshot consistency
//! - `generate` - Write synthetic parcel data for testing

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CountySync command-line sync tools.
#[derive(Parser)]
#[command(name = "countysync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync output directory
    #[arg(global = true, short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync an input batch into the output directory
    Run {
        /// Input file (JSON array of parcel records)
        #[arg(required_unless_present = "test_data")]
        input: Option<PathBuf>,

        /// Records fingerprinted per progress chunk
        #[arg(short, long, default_value = "1000")]
        batch_size: usize,

        /// Use generated synthetic parcels instead of an input file
        #[arg(short, long)]
        test_data: bool,

        /// Number of synthetic parcels (with --test-data)
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Random seed for synthetic parcels (with --test-data)
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// List each rejected input record
        #[arg(short, long)]
        rejected: bool,
    },

    /// Show recent sync runs from the audit log
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check store and snapshot consistency
    Verify,

    /// Write synthetic parcel data for testing
    Generate {
        /// Output file for the generated records
        #[arg(short = 'f', long, default_value = "test_parcels.json")]
        out: PathBuf,

        /// Number of parcels to generate
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Random seed for reproducibility
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            input,
            batch_size,
            test_data,
            count,
            seed,
            rejected,
        } => {
            let output_dir = cli.output_dir.ok_or("Output directory required for run")?;
            let source = if test_data {
                commands::run::Source::Generated { count, seed }
            } else {
                commands::run::Source::File(input.ok_or("Input file required without --test-data")?)
            };
            commands::run::run(&output_dir, source, batch_size, rejected)?;
        }
        Commands::History { limit, format } => {
            let output_dir = cli
                .output_dir
                .ok_or("Output directory required for history")?;
            commands::history::run(&output_dir, limit, &format)?;
        }
        Commands::Verify => {
            let output_dir = cli
                .output_dir
                .ok_or("Output directory required for verify")?;
            commands::verify::run(&output_dir)?;
        }
        Commands::Generate { out, count, seed } => {
            commands::generate::run(&out, count, seed)?;
        }
    }

    Ok(())
}
