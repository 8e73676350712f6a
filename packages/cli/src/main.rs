#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for fetching and exporting police datasets.

use std::path::PathBuf;
use std::str::FromStr as _;

use clap::{Parser, Subcommand};
use police_data_catalog::build_catalog;
use police_data_catalog_models::{TableType, YearSpec};
use police_data_source::Source;

#[derive(Parser)]
#[command(name = "police_data_cli", about = "Police data fetch and export tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all cataloged datasets
    Sources,
    /// Show the table types and years available from one source
    Tables {
        /// Source name (e.g., "Virginia")
        source: String,
        /// State name, needed when the source name is not unique
        #[arg(long)]
        state: Option<String>,
    },
    /// Fetch a dataset and export it as CSV
    Fetch {
        /// Source name (e.g., "`Fairfax County Police Department`")
        source: String,
        /// State name, needed when the source name is not unique
        #[arg(long)]
        state: Option<String>,
        /// Table type (e.g., "ARRESTS", "TRAFFIC STOPS")
        #[arg(long)]
        table_type: String,
        /// Year to fetch
        #[arg(long)]
        year: i32,
        /// End year, to fetch an inclusive range instead of a single year
        #[arg(long)]
        year_end: Option<i32>,
        /// Only return data for this agency (multi-agency datasets)
        #[arg(long)]
        agency: Option<String>,
        /// Maximum number of records to fetch
        #[arg(long)]
        limit: Option<u64>,
        /// Output directory (default: current directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Re-download even when the export file already exists
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let catalog = build_catalog();

    match cli.command {
        Commands::Sources => {
            for descriptor in catalog.all() {
                println!(
                    "{}  {} / {} / {} / {} ({})",
                    descriptor.id,
                    descriptor.state,
                    descriptor.source_name,
                    descriptor.table_type,
                    descriptor.year,
                    descriptor.backend
                );
            }
        }
        Commands::Tables { source, state } => {
            let source = Source::new(&catalog, &source, state.as_deref())?;
            for table_type in source.table_types() {
                let years = source.years(Some(table_type)).await?;
                let years: Vec<String> = years.iter().map(ToString::to_string).collect();
                println!("{table_type}: {}", years.join(", "));
            }
        }
        Commands::Fetch {
            source,
            state,
            table_type,
            year,
            year_end,
            agency,
            limit,
            output_dir,
            force,
        } => {
            let table_type = TableType::from_str(&table_type)
                .map_err(|_| format!("unknown table type: {table_type}"))?;
            let year_spec =
                year_end.map_or(YearSpec::Exact(year), |end| YearSpec::Range(year, end));

            let mut source = Source::new(&catalog, &source, state.as_deref())?;
            if let Some(limit) = limit {
                source = source.with_limit(limit);
            }

            let path = source
                .export_filename(
                    &year_spec,
                    output_dir.as_deref(),
                    Some(table_type),
                    agency.as_deref(),
                )
                .await?;
            if path.exists() && !force {
                log::info!("{} already exists, skipping fetch", path.display());
                println!("{} (already exported)", path.display());
                return Ok(());
            }

            let table = source
                .load_from_remote(&year_spec, Some(table_type), agency.as_deref())
                .await?;
            let written = table.export(output_dir.as_deref(), None)?;
            println!("{}", written.display());
        }
    }

    Ok(())
}
