//! Flat CSV export of per-stage count and tonnage.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::data::{Dataset, Metric, Normalizer};
use crate::stats::{FunnelCalculator, FunnelSnapshot};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to build export table: {0}")]
    TableError(#[from] PolarsError),
    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One exported line: a stage with both metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub stage: String,
    pub count: f64,
    pub tonnage: f64,
}

/// Builds (stage, count, tonnage) tables.
pub struct StageBreakdown;

impl StageBreakdown {
    /// Zip a count snapshot with a tonnage snapshot of the same stages.
    pub fn from_snapshots(count: &FunnelSnapshot, tonnage: &FunnelSnapshot) -> Vec<BreakdownRow> {
        count
            .iter()
            .zip(tonnage.values.iter())
            .map(|((stage, c), t)| BreakdownRow {
                stage: stage.to_string(),
                count: c,
                tonnage: *t,
            })
            .collect()
    }

    /// Breakdown for the records matching `date` and `branch`.
    pub fn compute(
        dataset: &Dataset,
        date: Option<NaiveDate>,
        branch: Option<&str>,
    ) -> Vec<BreakdownRow> {
        let count = FunnelCalculator::compute_funnel(dataset, Metric::Count, date, branch);
        let tonnage = FunnelCalculator::compute_funnel(dataset, Metric::Tonnage, date, branch);
        Self::from_snapshots(&count, &tonnage)
    }

    pub fn to_frame(rows: &[BreakdownRow]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Column::new(
                "stage".into(),
                rows.iter().map(|r| r.stage.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "count".into(),
                rows.iter().map(|r| r.count).collect::<Vec<_>>(),
            ),
            Column::new(
                "tonnage".into(),
                rows.iter().map(|r| r.tonnage).collect::<Vec<_>>(),
            ),
        ])
    }
}

/// Serialize a breakdown as UTF-8 CSV with a `stage,count,tonnage` header.
pub fn export_csv(rows: &[BreakdownRow]) -> Result<Vec<u8>, ExportError> {
    let mut df = StageBreakdown::to_frame(rows)?;
    write_frame(&mut df)
}

/// Serialize the whole dataset in long format (one row per record, stage and metric).
pub fn export_long_csv(dataset: &Dataset) -> Result<Vec<u8>, ExportError> {
    let mut df = Normalizer::to_long_frame(dataset)?;
    write_frame(&mut df)
}

fn write_frame(df: &mut DataFrame) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;
    Ok(buf)
}

/// Write exported bytes to `path`.
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    std::fs::write(path, bytes).map_err(|source| ExportError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// `funnel_<branch>_<date>.csv`, with `all_branches` / `full_period` when unfiltered.
pub fn export_file_name(branch: Option<&str>, date: Option<NaiveDate>) -> String {
    let branch = branch
        .map(sanitize)
        .unwrap_or_else(|| "all_branches".to_string());
    let period = date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "full_period".to_string());
    format!("funnel_{branch}_{period}.csv")
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, StageValues};

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["Cold".into(), "Meeting".into()],
            vec![
                Record {
                    date: "2024-01-01".parse().unwrap(),
                    branch: "A".into(),
                    values: vec![StageValues::new(100.0, 12.5), StageValues::new(40.0, 4.0)],
                },
                Record {
                    date: "2024-01-02".parse().unwrap(),
                    branch: "B".into(),
                    values: vec![StageValues::new(50.0, 2.5), StageValues::new(20.0, 1.0)],
                },
            ],
        )
    }

    fn parse_rows(csv: &str) -> Vec<(String, f64, f64)> {
        csv.lines()
            .skip(1)
            .map(|line| {
                let fields: Vec<&str> = line.split(',').collect();
                (
                    fields[0].to_string(),
                    fields[1].parse().unwrap(),
                    fields[2].parse().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_breakdown_pairs_metrics() {
        let rows = StageBreakdown::compute(&dataset(), None, None);
        assert_eq!(
            rows,
            vec![
                BreakdownRow {
                    stage: "Cold".into(),
                    count: 150.0,
                    tonnage: 15.0
                },
                BreakdownRow {
                    stage: "Meeting".into(),
                    count: 60.0,
                    tonnage: 5.0
                },
            ]
        );
    }

    #[test]
    fn test_export_csv_layout() {
        let rows = StageBreakdown::compute(&dataset(), None, Some("A"));
        let csv = String::from_utf8(export_csv(&rows).unwrap()).unwrap();

        assert_eq!(csv.lines().next(), Some("stage,count,tonnage"));
        assert_eq!(
            parse_rows(&csv),
            vec![
                ("Cold".to_string(), 100.0, 12.5),
                ("Meeting".to_string(), 40.0, 4.0)
            ]
        );
    }

    #[test]
    fn test_export_csv_empty_filter_still_lists_stages() {
        let rows = StageBreakdown::compute(&dataset(), None, Some("Nowhere"));
        let csv = String::from_utf8(export_csv(&rows).unwrap()).unwrap();
        assert_eq!(
            parse_rows(&csv),
            vec![("Cold".to_string(), 0.0, 0.0), ("Meeting".to_string(), 0.0, 0.0)]
        );
    }

    #[test]
    fn test_export_long_csv() {
        let csv = String::from_utf8(export_long_csv(&dataset()).unwrap()).unwrap();
        assert_eq!(csv.lines().next(), Some("date,branch,stage,metric,value"));
        assert_eq!(csv.lines().count(), 1 + 2 * 2 * 2);
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(
            export_file_name(None, None),
            "funnel_all_branches_full_period.csv"
        );
        assert_eq!(
            export_file_name(Some("North West/2"), "2024-03-01".parse().ok()),
            "funnel_North_West_2_2024-03-01.csv"
        );
        assert_eq!(export_file_name(Some("  "), None), "funnel_unnamed_full_period.csv");
    }

    #[test]
    fn test_write_export() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.csv");
        write_export(&path, b"stage,count,tonnage\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "stage,count,tonnage\n"
        );

        let missing_dir = tmp.path().join("nope").join("out.csv");
        assert!(matches!(
            write_export(&missing_dir, b""),
            Err(ExportError::FileWrite { .. })
        ));
    }
}
