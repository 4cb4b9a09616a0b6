//! Command-line interface argument parsing.

use chrono::NaiveDate;
use clap::Parser;
use funnel_pro::{Metric, StageSource};
use std::path::PathBuf;
use tracing::Level;

/// Funnel Pro - sales funnel analysis for branch/date spreadsheets
///
/// Reads a sheet whose first two rows are headers: column 0 is the date,
/// column 1 the branch, then a (count, tonnage) column pair per stage.
///
/// Examples:
///   funnel_pro sales.xlsx
///   funnel_pro sales.xlsx --metric tonnage --date 2024-03-01 --branch North
///   funnel_pro sales.csv --export --format json
///   funnel_pro --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Funnel spreadsheet (.xlsx, .xls, .ods or .csv)
    #[arg(value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Metric to analyze
    #[arg(short, long, value_enum)]
    pub metric: Option<Metric>,

    /// Analyze a single date (YYYY-MM-DD); the full period when omitted
    #[arg(short, long, value_name = "DATE", value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,

    /// Analyze a single branch; all branches when omitted
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Rescale stage values so the largest is 100
    #[arg(long)]
    pub normalize: bool,

    /// Stage names in funnel order (comma-separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub stages: Option<Vec<String>>,

    /// Where stage names come from
    #[arg(long, value_enum, value_name = "SOURCE")]
    pub stage_source: Option<StageSource>,

    /// Worksheet to read from a workbook
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the stage/count/tonnage table as CSV
    #[arg(long)]
    pub export: bool,

    /// Write the whole dataset in long format to this CSV file
    #[arg(long, value_name = "FILE")]
    pub export_long: Option<PathBuf>,

    /// Directory for --export files
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Also show the funnel of every branch side by side
    #[arg(long)]
    pub compare_branches: bool,

    /// Print the first N loaded records
    #[arg(long, value_name = "N")]
    pub preview: Option<usize>,

    /// Path to configuration file (defaults to ./funnel.toml if present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default funnel.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{s}': {e}"))
}

impl Args {
    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref names) = self.stages {
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err("Stage names must not be empty".to_string());
            }
        }

        if self.preview == Some(0) {
            return Err("--preview must be at least 1".to_string());
        }

        Ok(())
    }

    /// Default log level from the verbosity flags.
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::ERROR
        } else {
            Level::INFO
        }
    }
}
