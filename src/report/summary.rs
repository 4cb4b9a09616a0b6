//! Funnel report assembly and plain-text rendering.

use chrono::NaiveDate;
use serde::Serialize;

use super::export::{BreakdownRow, StageBreakdown};
use crate::data::{Dataset, Metric};
use crate::stats::{
    BranchFunnel, ConversionStep, FunnelCalculator, FunnelQuery, FunnelSnapshot, SummaryStats,
};

/// Everything derived for one query, ready for a presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelReport {
    pub metric: Metric,
    pub period: String,
    pub date: Option<NaiveDate>,
    pub branch: Option<String>,
    pub snapshot: FunnelSnapshot,
    pub conversions: Vec<ConversionStep>,
    pub percent_of_initial: Vec<f64>,
    pub summary: SummaryStats,
    /// Only reported for full-period queries.
    pub average_per_day: Option<f64>,
    pub breakdown: Vec<BreakdownRow>,
}

impl FunnelReport {
    pub fn build(dataset: &Dataset, query: &FunnelQuery) -> Self {
        let branch = query.branch.as_deref();
        let raw = FunnelCalculator::compute_funnel(dataset, query.metric, query.date, branch);
        let snapshot = if query.normalize {
            FunnelCalculator::normalize(&raw)
        } else {
            raw.clone()
        };

        let average_per_day = query
            .is_full_period()
            .then(|| FunnelCalculator::average_per_day(dataset, &raw));

        Self {
            metric: query.metric,
            period: period_label(dataset, query.date),
            date: query.date,
            branch: query.branch.clone(),
            conversions: FunnelCalculator::compute_conversions(&snapshot),
            percent_of_initial: FunnelCalculator::compute_percent_of_initial(&snapshot),
            summary: FunnelCalculator::summary_stats(&snapshot),
            average_per_day,
            breakdown: StageBreakdown::compute(dataset, query.date, branch),
            snapshot,
        }
    }

    pub fn branch_label(&self) -> &str {
        self.branch.as_deref().unwrap_or("all branches")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let width = stage_width(&self.snapshot.stages);
        let unit = if self.snapshot.normalized {
            format!("{} (normalized)", self.metric)
        } else {
            self.metric.to_string()
        };

        out.push_str(&format!("Sales funnel: {unit}\n"));
        out.push_str(&format!("Period: {}\n", self.period));
        out.push_str(&format!("Branch: {}\n", self.branch_label()));

        if self.snapshot.is_empty_result() {
            out.push_str("\nNo records match the selected date and branch.\n");
        }

        out.push('\n');
        for (i, (stage, value)) in self.snapshot.iter().enumerate() {
            match i.checked_sub(1).and_then(|j| self.percent_of_initial.get(j)) {
                Some(pct) => out.push_str(&format!(
                    "  {stage:<width$}  {value:>12.1}  ({pct:.1}% of initial)\n"
                )),
                None => out.push_str(&format!("  {stage:<width$}  {value:>12.1}\n")),
            }
        }

        if self.conversions.is_empty() {
            out.push_str("\nNot enough stages to compute conversion.\n");
        } else {
            out.push_str("\nConversion between stages:\n");
            for step in &self.conversions {
                out.push_str(&format!(
                    "  {} -> {}: {:.1}%\n",
                    step.from_stage, step.to_stage, step.rate_percent
                ));
            }
        }

        out.push_str(&format!("\nInitial stage:    {:.1}\n", self.summary.initial));
        out.push_str(&format!("Final stage:      {:.1}\n", self.summary.final_value));
        out.push_str(&format!(
            "Total conversion: {:.1}%\n",
            self.summary.total_conversion_percent
        ));
        out.push_str(&format!("Total loss:       {:.1}\n", self.summary.total_loss));
        if let Some(avg) = self.average_per_day {
            out.push_str(&format!("Average per day:  {avg:.1}\n"));
        }

        out
    }
}

/// `YYYY-MM-DD` for a single day, the covered range for the full period.
pub fn period_label(dataset: &Dataset, date: Option<NaiveDate>) -> String {
    match (date, dataset.date_range()) {
        (Some(d), _) => d.format("%Y-%m-%d").to_string(),
        (None, Some((min, max))) => format!(
            "full period ({} to {})",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        ),
        (None, None) => "full period".to_string(),
    }
}

/// One line per branch: stage values and total conversion.
pub fn render_branch_comparison(branches: &[BranchFunnel]) -> String {
    let mut out = String::new();
    let Some(first) = branches.first() else {
        return "No branches to compare.\n".to_string();
    };

    let width = stage_width(&branches.iter().map(|b| b.branch.clone()).collect::<Vec<_>>());
    out.push_str(&format!("  {:<width$}", "Branch"));
    for stage in &first.snapshot.stages {
        out.push_str(&format!("  {stage:>12}"));
    }
    out.push_str(&format!("  {:>10}\n", "Conversion"));

    for b in branches {
        out.push_str(&format!("  {:<width$}", b.branch));
        for value in &b.snapshot.values {
            out.push_str(&format!("  {value:>12.1}"));
        }
        out.push_str(&format!("  {:>9.1}%\n", b.summary.total_conversion_percent));
    }
    out
}

/// First `limit` records with count/tonnage per stage.
pub fn render_preview(dataset: &Dataset, limit: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<10}  {:<16}", "Date", "Branch"));
    for stage in dataset.stages() {
        out.push_str(&format!("  {stage:>16}"));
    }
    out.push('\n');

    for record in dataset.preview(limit) {
        out.push_str(&format!(
            "{:<10}  {:<16}",
            record.date.format("%Y-%m-%d"),
            record.branch
        ));
        for v in &record.values {
            let cell = format!("{:.1}/{:.1}", v.count, v.tonnage);
            out.push_str(&format!("  {cell:>16}"));
        }
        out.push('\n');
    }

    if dataset.len() > limit {
        out.push_str(&format!("Showing {} of {} records.\n", limit, dataset.len()));
    }
    out
}

fn stage_width(names: &[String]) -> usize {
    names
        .iter()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0)
        .max(6)
}
