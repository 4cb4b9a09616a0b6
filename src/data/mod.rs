//! Data module - funnel sheet loading and normalization

mod dataset;
mod dates;
mod loader;
mod normalizer;

pub use dataset::{Dataset, Metric, Record, StageValues};
pub use dates::{from_excel_serial, parse_date};
pub use loader::{DataLoader, InputFormat, LoaderError};
pub use normalizer::{Normalizer, StageLayout, StageSource, DEFAULT_STAGES, HEADER_ROWS};
