//! Parser - Builds the unified detentions table from yearly workbooks
//!
//! Responsibilities:
//! - Discover `<yyyy>*.xlsb` workbooks in the data directory
//! - Enforce the raw header layout (fails the whole run on mismatch)
//! - Keep rows whose in-file year matches the file name
//! - Coerce counts and months, export one CSV
//!
//! Usage:
//!   cargo run --bin parser -- --data-dir data --output detentions_2021_25.csv
//!   cargo run --bin parser -- --layout compact --no-months

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use detenciones_parser::{export_csv, load_dataset, source::WORKBOOK_EXTENSIONS, ExportLayout, Settings, WorkbookSource};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Normalizes yearly detention workbooks into one CSV")]
struct Args {
    /// Directory with the yearly workbooks
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Output CSV path
    #[arg(long, default_value = "detentions_2021_25.csv")]
    output: PathBuf,

    /// Output columns: full (12 columns) or compact (5 columns)
    #[arg(long, default_value = "full")]
    layout: ExportLayout,

    /// Keep month names as written instead of converting them to 1-12
    #[arg(long, default_value = "false")]
    no_months: bool,

    /// Zero-based row index of the header in every sheet
    #[arg(long, env = "HEADER_ROW")]
    header_row: Option<usize>,

    /// Dry run - normalize and report, don't write the CSV
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let args = Args::parse();
    let mut settings = Settings::from_env().context("Invalid environment settings")?;
    settings.data_dir = args.data_dir.clone();
    if let Some(row) = args.header_row {
        settings.header_row = row;
    }
    let config = settings.pipeline(args.layout, !args.no_months);

    println!("=== Detenciones Parser ===");
    println!("Data dir: {}", settings.data_dir.display());
    println!("Layout: {:?}", args.layout);
    println!("Months: {}", if config.convert_months { "numeric" } else { "raw" });
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "export" });

    let dataset = load_dataset(&WorkbookSource, &settings.data_dir, WORKBOOK_EXTENSIONS, &config)
        .with_context(|| format!("Failed to load workbooks from {}", settings.data_dir.display()))?;

    if dataset.reports.is_empty() {
        warn!(
            dir = %settings.data_dir.display(),
            "no workbooks named <yyyy>*.xlsb found, exporting an empty table"
        );
    }

    println!("\nFiles:");
    for report in &dataset.reports {
        println!(
            "  {} (year {}): {} rows, kept {}, dropped {} with another in-file year",
            report.file, report.year, report.raw_rows, report.kept_rows, report.dropped_year_mismatch
        );
    }
    println!("\nRows: {}", dataset.len());
    println!("Total detentions: {}", dataset.total_detentions());
    println!("Nationalities: {}", dataset.nationalities().len());

    if args.dry_run {
        println!("\nDry run - nothing written");
        return Ok(());
    }

    export_csv(&dataset, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("\n=== Export Complete ===");
    println!("Wrote {} rows to {}", dataset.len(), args.output.display());

    Ok(())
}
