//! Funnel Pro - Sales Funnel Spreadsheet Analysis
//!
//! Command-line front end: loads a funnel sheet, prints the funnel for the
//! selected metric, date and branch, and optionally exports CSV tables.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, unreadable config or input, failed export

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, OutputFormat};
use config::Config;
use funnel_pro::report::{
    export_csv, export_file_name, export_long_csv, render_branch_comparison, render_preview,
    write_export, FunnelReport,
};
use funnel_pro::{DataLoader, FunnelCalculator, FunnelQuery};
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Write a default funnel.toml into the working directory.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists; remove it or edit it", path.display());
    }

    std::fs::write(path, Config::default_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {} with default settings.", path.display());
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` wins over the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_dir(Path::new("."))?.unwrap_or_default(),
    };
    config.merge_with_args(args);
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let input = args.input.as_deref().context("No input file given")?;

    let loader = DataLoader::new(config.stage_layout()).with_sheet(config.input.sheet.clone());
    let dataset = loader
        .load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    if let Some((min, max)) = dataset.date_range() {
        info!(
            "{} records, {} to {}, branches: {}",
            dataset.len(),
            min,
            max,
            dataset.branches().join(", ")
        );
    }
    if dataset.skipped_rows() > 0 {
        info!("{} rows skipped (unparseable date)", dataset.skipped_rows());
    }

    if let Some(limit) = args.preview {
        println!("{}", render_preview(&dataset, limit));
    }

    let query = FunnelQuery::new(config.report.metric)
        .on_date(args.date)
        .for_branch(args.branch.clone())
        .normalized(config.report.normalize);
    let report = FunnelReport::build(&dataset, &query);
    let branches = args
        .compare_branches
        .then(|| FunnelCalculator::compare_branches(&dataset, query.metric, query.date));

    match args.format {
        OutputFormat::Text => {
            print!("{}", report.render_text());
            if let Some(ref branches) = branches {
                println!("\nBy branch ({}):", query.metric);
                print!("{}", render_branch_comparison(branches));
            }
        }
        OutputFormat::Json => {
            let json = if let Some(ref branches) = branches {
                serde_json::to_string_pretty(&serde_json::json!({
                    "report": &report,
                    "branches": branches,
                }))?
            } else {
                report.to_json()?
            };
            println!("{}", json);
        }
    }

    if args.export {
        let bytes = export_csv(&report.breakdown)?;
        let path = config
            .report
            .export_dir
            .join(export_file_name(query.branch.as_deref(), query.date));
        write_export(&path, &bytes)?;
        println!("Exported {}", path.display());
    }

    if let Some(ref path) = args.export_long {
        let bytes = export_long_csv(&dataset)?;
        write_export(path, &bytes)?;
        println!("Exported {}", path.display());
    }

    Ok(())
}
