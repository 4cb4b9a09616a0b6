//! Funnel Sheet Loader Module
//! Reads CSV files and spreadsheet workbooks into a raw Polars text frame,
//! then hands it to the [`Normalizer`].

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::dataset::Dataset;
use super::normalizer::{Normalizer, StageLayout};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load table: {0}")]
    TableError(#[from] PolarsError),
    #[error("Failed to parse CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to load workbook: {0}")]
    WorkbookError(#[from] calamine::Error),
}

/// Supported input file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Workbook,
}

impl InputFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(InputFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Workbook),
            _ => Err(LoaderError::UnsupportedFormat(format!(
                "{} (expected .csv, .xlsx, .xls or .ods)",
                path.display()
            ))),
        }
    }
}

/// Loads funnel sheets into [`Dataset`]s.
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    layout: StageLayout,
    sheet: Option<String>,
}

impl DataLoader {
    pub fn new(layout: StageLayout) -> Self {
        Self {
            layout,
            sheet: None,
        }
    }

    /// Read a named worksheet instead of the first one.
    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Load and normalize a funnel sheet.
    pub fn load(&self, path: &Path) -> Result<Dataset, LoaderError> {
        let raw = self.read_raw(path)?;
        debug!(
            "Read raw table {}x{} from {}",
            raw.height(),
            raw.width(),
            path.display()
        );

        let dataset = Normalizer::normalize(&raw, &self.layout)?.with_source(path.to_path_buf());

        info!(
            "Loaded {} records across {} stages from {}",
            dataset.len(),
            dataset.stages().len(),
            path.display()
        );
        Ok(dataset)
    }

    /// Read the file as an untyped grid: every column text, headers included.
    pub fn read_raw(&self, path: &Path) -> Result<DataFrame, LoaderError> {
        let format = InputFormat::from_path(path)?;

        if !path.is_file() {
            return Err(LoaderError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        match format {
            InputFormat::Csv => Self::read_csv(path),
            InputFormat::Workbook => self.read_workbook(path),
        }
    }

    fn read_csv(path: &Path) -> Result<DataFrame, LoaderError> {
        // Flexible: the first header row often stops at the last stage label,
        // so the widest row sets the column count.
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| Some(field.to_string()).filter(|v| !v.is_empty()))
                    .collect(),
            );
        }
        Ok(grid_to_frame(rows)?)
    }

    fn read_workbook(&self, path: &Path) -> Result<DataFrame, LoaderError> {
        let mut workbook = open_workbook_auto(path)?;

        let range = match &self.sheet {
            Some(name) => workbook.worksheet_range(name)?,
            None => workbook.worksheet_range_at(0).ok_or_else(|| {
                LoaderError::MalformedInput("workbook has no worksheets".to_string())
            })??,
        };

        let rows: Vec<Vec<Option<String>>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_text).collect())
            .collect();
        Ok(grid_to_frame(rows)?)
    }
}

/// Build a text frame from rows of cells; short rows are padded with nulls.
fn grid_to_frame(rows: Vec<Vec<Option<String>>>) -> PolarsResult<DataFrame> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        let len = row.len();
        for (i, cell) in row.into_iter().enumerate() {
            columns[i].push(cell);
        }
        for column in &mut columns[len..] {
            column.push(None);
        }
    }

    DataFrame::new(
        columns
            .into_iter()
            .enumerate()
            .map(|(i, values)| Column::new(format!("column_{}", i + 1).into(), values))
            .collect(),
    )
}

/// Render a workbook cell as text; date cells become `YYYY-MM-DD`.
fn cell_to_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(v) => Some(v.clone()),
        Data::Float(v) => Some(v.to_string()),
        Data::Int(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(v) => Some(
            v.as_datetime()
                .map(|dt| dt.date().format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| v.as_f64().to_string()),
        ),
        Data::DateTimeIso(v) | Data::DurationIso(v) => Some(v.clone()),
    }
}
