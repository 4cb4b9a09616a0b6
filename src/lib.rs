//! Funnel Pro - Sales Funnel Spreadsheet Analysis
//!
//! Loads a two-header-row funnel sheet (date, branch, then count/tonnage per
//! stage) and computes stage totals, conversions and loss statistics filtered
//! by date and branch.

pub mod data;
pub mod report;
pub mod stats;

pub use data::{DataLoader, Dataset, LoaderError, Metric, Record, StageLayout, StageSource};
pub use report::{BreakdownRow, FunnelReport};
pub use stats::{ConversionStep, FunnelCalculator, FunnelQuery, FunnelSnapshot, SummaryStats};
