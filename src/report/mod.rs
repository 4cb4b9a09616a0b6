//! Report module - exports and summaries for a presentation layer

mod export;
mod summary;

pub use export::{
    export_csv, export_file_name, export_long_csv, write_export, BreakdownRow, ExportError,
    StageBreakdown,
};
pub use summary::{period_label, render_branch_comparison, render_preview, FunnelReport};
