//! Funnel Table Normalizer Module
//! Reshapes a raw two-header-row sheet into typed funnel records.
//!
//! Raw layout: column 0 is the date, column 1 the branch, and every following
//! pair of columns holds (count, tonnage) for one stage in funnel order.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dataset::{Dataset, Metric, Record, StageValues};
use super::dates::parse_date;
use super::loader::LoaderError;

/// Header rows preceding the data rows.
pub const HEADER_ROWS: usize = 2;

/// Date and branch columns.
const FIXED_COLUMNS: usize = 2;

/// Stage names used when none are configured.
pub const DEFAULT_STAGES: [&str; 6] = [
    "Cold", "Meeting", "Proposal", "Approval", "Contract", "Delivery",
];

/// Where stage names come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StageSource {
    /// Configured names by pair position
    #[default]
    Configured,
    /// Label in the first header row, configured name when blank
    Header,
}

/// Stage naming for the column pairs of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct StageLayout {
    pub names: Vec<String>,
    pub source: StageSource,
}

impl Default for StageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STAGES.iter().map(|s| s.to_string()).collect())
    }
}

impl StageLayout {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            source: StageSource::Configured,
        }
    }

    pub fn with_source(mut self, source: StageSource) -> Self {
        self.source = source;
        self
    }

    /// Name for pair `index`, given the pair's first header cell.
    pub fn resolve(&self, index: usize, header: Option<&str>) -> String {
        if self.source == StageSource::Header {
            if let Some(label) = header.map(str::trim).filter(|h| !h.is_empty()) {
                return label.to_string();
            }
        }
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Stage_{index}"))
    }
}

/// Turns raw text frames into [`Dataset`]s.
pub struct Normalizer;

impl Normalizer {
    /// Normalize a raw frame whose first two rows are headers.
    ///
    /// Rows with an unparseable date are dropped and counted in
    /// [`Dataset::skipped_rows`]. Numeric cells that fail to parse or are
    /// negative become 0.
    pub fn normalize(raw: &DataFrame, layout: &StageLayout) -> Result<Dataset, LoaderError> {
        let width = raw.width();
        if width < FIXED_COLUMNS {
            return Err(LoaderError::MalformedInput(format!(
                "expected at least {FIXED_COLUMNS} columns (date, branch), found {width}"
            )));
        }
        if raw.height() <= HEADER_ROWS {
            return Err(LoaderError::MalformedInput(
                "no data rows below the two header rows".to_string(),
            ));
        }

        let text_series: Vec<Series> = raw
            .get_columns()
            .iter()
            .map(|c| c.as_materialized_series().cast(&DataType::String))
            .collect::<PolarsResult<_>>()?;
        let text: Vec<&StringChunked> = text_series
            .iter()
            .map(|s| s.str())
            .collect::<PolarsResult<_>>()?;

        let pair_count = (width - FIXED_COLUMNS).div_ceil(2);
        if pair_count != layout.names.len() {
            warn!(
                "Sheet has {} stage column pairs but {} stage names are configured",
                pair_count,
                layout.names.len()
            );
        }

        let stages: Vec<String> = (0..pair_count)
            .map(|p| layout.resolve(p, text[FIXED_COLUMNS + 2 * p].get(0)))
            .collect();

        let data_rows = raw.height() - HEADER_ROWS;
        let mut stage_columns: Vec<(Vec<f64>, Vec<f64>)> = Vec::with_capacity(pair_count);
        for p in 0..pair_count {
            let count_col = FIXED_COLUMNS + 2 * p;
            let tonnage_col = count_col + 1;

            let counts = Self::coerce_numeric(text[count_col])?;
            let tonnages = if tonnage_col < width {
                Self::coerce_numeric(text[tonnage_col])?
            } else {
                vec![0.0; data_rows]
            };
            stage_columns.push((counts, tonnages));
        }

        let mut records = Vec::with_capacity(data_rows);
        let mut skipped = 0usize;

        for row in 0..data_rows {
            let idx = row + HEADER_ROWS;
            if Self::is_blank_row(&text, idx) {
                continue;
            }

            let date_cell = text[0].get(idx);
            let Some(date) = date_cell.and_then(parse_date) else {
                skipped += 1;
                debug!(
                    "Dropping row {}: unparseable date {:?}",
                    idx + 1,
                    date_cell.unwrap_or("")
                );
                continue;
            };

            let branch = text[1].get(idx).map(str::trim).unwrap_or("").to_string();
            let values = stage_columns
                .iter()
                .map(|(counts, tonnages)| StageValues::new(counts[row], tonnages[row]))
                .collect();

            records.push(Record {
                date,
                branch,
                values,
            });
        }

        if skipped > 0 {
            warn!("Dropped {} rows with unparseable dates", skipped);
        }

        if records.is_empty() {
            return Err(LoaderError::MalformedInput(format!(
                "no rows with a parseable date ({skipped} dropped)"
            )));
        }

        Ok(Dataset::new(stages, records).with_skipped_rows(skipped))
    }

    /// Coerce the data rows of a text column to numbers. Unparseable, non-finite
    /// and negative values become 0; counts and tonnages are never negative.
    fn coerce_numeric(column: &StringChunked) -> PolarsResult<Vec<f64>> {
        let trimmed: Vec<Option<&str>> = column
            .into_iter()
            .skip(HEADER_ROWS)
            .map(|v| v.map(str::trim))
            .collect();

        let numeric = Series::new("value".into(), trimmed).cast(&DataType::Float64)?;
        let values = numeric
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if x.is_finite() && x >= 0.0 => x,
                _ => 0.0,
            })
            .collect();

        Ok(values)
    }

    fn is_blank_row(text: &[&StringChunked], idx: usize) -> bool {
        text.iter()
            .all(|col| col.get(idx).map_or(true, |v| v.trim().is_empty()))
    }

    /// Transform a dataset to long format (stack operation).
    ///
    /// Output columns: ["date", "branch", "stage", "metric", "value"]
    pub fn to_long_frame(dataset: &Dataset) -> PolarsResult<DataFrame> {
        let mut dates: Vec<String> = Vec::new();
        let mut branches: Vec<String> = Vec::new();
        let mut stages: Vec<String> = Vec::new();
        let mut metrics: Vec<&str> = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        for record in dataset.records() {
            let date = record.date.format("%Y-%m-%d").to_string();
            for (stage_idx, stage) in dataset.stages().iter().enumerate() {
                for metric in [Metric::Count, Metric::Tonnage] {
                    dates.push(date.clone());
                    branches.push(record.branch.clone());
                    stages.push(stage.clone());
                    metrics.push(metric.as_str());
                    values.push(record.value(stage_idx, metric));
                }
            }
        }

        DataFrame::new(vec![
            Column::new("date".into(), dates),
            Column::new("branch".into(), branches),
            Column::new("stage".into(), stages),
            Column::new("metric".into(), metrics),
            Column::new("value".into(), values),
        ])
    }
}
