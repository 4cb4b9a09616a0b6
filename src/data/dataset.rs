//! Normalized funnel records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Which per-stage quantity to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Number of deals or leads
    #[default]
    Count,
    /// Volume in tonnes
    Tonnage,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Tonnage => "tonnage",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count and tonnage recorded for one stage of one row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageValues {
    pub count: f64,
    pub tonnage: f64,
}

impl StageValues {
    pub fn new(count: f64, tonnage: f64) -> Self {
        Self { count, tonnage }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Count => self.count,
            Metric::Tonnage => self.tonnage,
        }
    }
}

/// One spreadsheet row: a branch's pipeline on a given day.
///
/// `values` is aligned with [`Dataset::stages`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub branch: String,
    pub values: Vec<StageValues>,
}

impl Record {
    /// Value of `metric` at stage position `stage`, zero when out of range.
    pub fn value(&self, stage: usize, metric: Metric) -> f64 {
        self.values
            .get(stage)
            .map(|v| v.get(metric))
            .unwrap_or(0.0)
    }
}

/// Immutable table of records plus the stage order they were read with.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    stages: Vec<String>,
    records: Vec<Record>,
    skipped_rows: usize,
    source: Option<PathBuf>,
}

impl Dataset {
    /// Build a dataset, padding or truncating each record to the stage count.
    pub fn new(stages: Vec<String>, records: Vec<Record>) -> Self {
        let width = stages.len();
        let records = records
            .into_iter()
            .map(|mut r| {
                r.values.resize(width, StageValues::default());
                r
            })
            .collect();

        Self {
            stages,
            records,
            skipped_rows: 0,
            source: None,
        }
    }

    pub(crate) fn with_skipped_rows(mut self, skipped: usize) -> Self {
        self.skipped_rows = skipped;
        self
    }

    pub(crate) fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    /// Stage names in funnel order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Data rows dropped at load time because their date could not be parsed.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// File the dataset was loaded from, if any.
    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Distinct dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct branch identifiers, sorted.
    pub fn branches(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.branch.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// First and last date covered, `None` for an empty dataset.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// First `n` records in file order.
    pub fn preview(&self, n: usize) -> &[Record] {
        &self.records[..n.min(self.records.len())]
    }
}
