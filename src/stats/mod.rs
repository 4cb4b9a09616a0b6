//! Stats module - funnel aggregation

mod funnel;

pub use funnel::{
    percent_of, BranchFunnel, ConversionStep, FunnelCalculator, FunnelQuery, FunnelSnapshot,
    SummaryStats,
};
