#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the geomatch address matcher.
//!
//! Resolves CSV address batches against reference data stored in a
//! `DuckDB` file or loaded from CSVs, and manages that reference file.
//! Without a subcommand, an interactive menu is shown.
//!
//! Uses `indicatif-log-bridge` (via [`geomatch_cli_utils::init_logger`])
//! so log lines and progress bars never fight for the terminal.

mod commands;
mod interactive;
mod reference;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geomatch_matcher::config::Overrides;

use crate::commands::RunOptions;
use crate::reference::ReferenceSpec;

#[derive(Parser)]
#[command(name = "geomatch", about = "Malaysian address geocode matcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every row of an address CSV and write a result CSV
    Run {
        /// Input CSV with `full_address` and `postcode` columns
        #[arg(long, short)]
        input: PathBuf,
        /// Result CSV (default: `data/output/<input>_matched.csv`)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Built-in preset id (see `geomatch presets`)
        #[arg(long, conflicts_with = "config")]
        preset: Option<String>,
        /// TOML config file instead of a preset
        #[arg(long)]
        config: Option<PathBuf>,
        /// Reference `DuckDB` file (default: `data/reference.duckdb`)
        #[arg(long, conflicts_with = "reference")]
        db: Option<PathBuf>,
        /// Load a reference CSV into memory instead of using the DB.
        /// Format: `collection=path.csv` or `collection:partition=path.csv`.
        /// May be repeated.
        #[arg(long)]
        reference: Vec<ReferenceSpec>,
        /// Number of parallel workers
        #[arg(long)]
        workers: Option<usize>,
        /// Maximum candidate rows read per lookup
        #[arg(long)]
        budget: Option<usize>,
        /// Comma-separated partitions in priority order (e.g., "202507,202506")
        #[arg(long, value_delimiter = ',')]
        partitions: Option<Vec<String>>,
    },
    /// Import reference CSVs into the `DuckDB` file
    Import {
        /// Collection to import into (e.g., "nodes")
        #[arg(long)]
        collection: String,
        /// Partition key for every imported row (e.g., "202507")
        #[arg(long)]
        partition: Option<String>,
        /// Reference `DuckDB` file (default: `data/reference.duckdb`)
        #[arg(long)]
        db: Option<PathBuf>,
        /// CSV files with `canonical_text`, `postcode`, `geocode` columns
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List row counts per collection and partition
    Partitions {
        /// Only this collection
        #[arg(long)]
        collection: Option<String>,
        /// Reference `DuckDB` file (default: `data/reference.duckdb`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show stored records for a postal code, optionally scored against an address
    Inspect {
        /// Postal code to look up
        #[arg(long)]
        postcode: String,
        /// Collection to read
        #[arg(long, default_value = "nodes")]
        collection: String,
        /// Maximum records to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Address to score each record against
        #[arg(long)]
        address: Option<String>,
        /// Preset whose tier settings are used for scoring
        #[arg(long)]
        preset: Option<String>,
        /// Reference `DuckDB` file (default: `data/reference.duckdb`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List built-in presets
    Presets,
    /// Check a TOML config file
    Validate {
        /// Config file to check
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geomatch_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    match command {
        Commands::Run {
            input,
            output,
            preset,
            config,
            db,
            reference,
            workers,
            budget,
            partitions,
        } => {
            commands::run(
                &multi,
                RunOptions {
                    input,
                    output,
                    preset,
                    config,
                    db,
                    references: reference,
                    overrides: Overrides {
                        worker_count: workers,
                        candidate_row_budget: budget,
                        partitions,
                    },
                },
            )
            .await?;
        }
        Commands::Import {
            collection,
            partition,
            db,
            files,
        } => {
            commands::import(
                &multi,
                db.as_deref(),
                &collection,
                partition.as_deref(),
                &files,
            )?;
        }
        Commands::Partitions { collection, db } => {
            commands::partitions(db.as_deref(), collection.as_deref())?;
        }
        Commands::Inspect {
            postcode,
            collection,
            limit,
            address,
            preset,
            db,
        } => {
            commands::inspect(
                db.as_deref(),
                &collection,
                &postcode,
                limit,
                address.as_deref(),
                preset.as_deref(),
            )?;
        }
        Commands::Presets => commands::list_presets(),
        Commands::Validate { path } => commands::validate(&path)?,
    }

    Ok(())
}
