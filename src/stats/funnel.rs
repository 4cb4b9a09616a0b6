//! Funnel Calculator Module
//! Per-stage totals, stage-to-stage conversion and loss statistics.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::data::{Dataset, Metric};

/// Filter and display selections for one funnel computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelQuery {
    pub metric: Metric,
    /// Exact date to aggregate; `None` aggregates the full period.
    pub date: Option<NaiveDate>,
    /// Exact branch to aggregate; `None` aggregates all branches.
    pub branch: Option<String>,
    /// Rescale stage values so the largest becomes 100.
    pub normalize: bool,
}

impl FunnelQuery {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    pub fn on_date(mut self, date: Option<NaiveDate>) -> Self {
        self.date = date;
        self
    }

    pub fn for_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn normalized(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn is_full_period(&self) -> bool {
        self.date.is_none()
    }
}

/// Summed stage values for one metric under one filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelSnapshot {
    pub metric: Metric,
    pub stages: Vec<String>,
    pub values: Vec<f64>,
    /// Records that passed the filter. Zero means the all-zero empty result.
    pub matched_records: usize,
    pub normalized: bool,
}

impl FunnelSnapshot {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when no record matched the filter.
    pub fn is_empty_result(&self) -> bool {
        self.matched_records == 0
    }

    /// (stage, value) pairs in funnel order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.stages
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn first(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn last(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Conversion between two consecutive stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionStep {
    pub from_stage: String,
    pub to_stage: String,
    pub rate_percent: f64,
}

/// Overall funnel outcome.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SummaryStats {
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
    pub total_conversion_percent: f64,
    /// `initial - final_value`; negative for a funnel that grows.
    pub total_loss: f64,
}

/// Funnel computed for one branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFunnel {
    pub branch: String,
    pub snapshot: FunnelSnapshot,
    pub summary: SummaryStats,
}

/// `100 * numerator / denominator`, or 0 when the denominator is not positive.
pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

/// Stateless funnel computations over an immutable [`Dataset`].
pub struct FunnelCalculator;

impl FunnelCalculator {
    /// Sum `metric` per stage over the records matching `date` and `branch`.
    ///
    /// Filters combine with AND; `None` disables a filter. When nothing
    /// matches, every stage is 0 and `matched_records` is 0.
    pub fn compute_funnel(
        dataset: &Dataset,
        metric: Metric,
        date: Option<NaiveDate>,
        branch: Option<&str>,
    ) -> FunnelSnapshot {
        let mut values = vec![0.0; dataset.stages().len()];
        let mut matched_records = 0;

        let included = dataset.records().iter().filter(|r| {
            date.map_or(true, |d| r.date == d) && branch.map_or(true, |b| r.branch == b)
        });

        for record in included {
            matched_records += 1;
            for (stage, total) in values.iter_mut().enumerate() {
                *total += record.value(stage, metric);
            }
        }

        FunnelSnapshot {
            metric,
            stages: dataset.stages().to_vec(),
            values,
            matched_records,
            normalized: false,
        }
    }

    /// Compute the funnel for `query`, normalizing when it asks to.
    pub fn run(dataset: &Dataset, query: &FunnelQuery) -> FunnelSnapshot {
        let snapshot =
            Self::compute_funnel(dataset, query.metric, query.date, query.branch.as_deref());
        if query.normalize {
            Self::normalize(&snapshot)
        } else {
            snapshot
        }
    }

    /// Rescale by `100 / max`; an all-zero snapshot stays all zero.
    pub fn normalize(snapshot: &FunnelSnapshot) -> FunnelSnapshot {
        let max = snapshot.max();
        let values = if max > 0.0 {
            snapshot.values.iter().map(|v| v / max * 100.0).collect()
        } else {
            snapshot.values.clone()
        };

        FunnelSnapshot {
            values,
            normalized: true,
            ..snapshot.clone()
        }
    }

    /// Conversion rate for every consecutive stage pair.
    pub fn compute_conversions(snapshot: &FunnelSnapshot) -> Vec<ConversionStep> {
        snapshot
            .values
            .windows(2)
            .enumerate()
            .map(|(i, pair)| ConversionStep {
                from_stage: snapshot.stages[i].clone(),
                to_stage: snapshot.stages[i + 1].clone(),
                rate_percent: percent_of(pair[1], pair[0]),
            })
            .collect()
    }

    /// Percent of the first stage for stages 1.. (the first stage has none).
    pub fn compute_percent_of_initial(snapshot: &FunnelSnapshot) -> Vec<f64> {
        let initial = snapshot.first();
        snapshot
            .values
            .iter()
            .skip(1)
            .map(|v| percent_of(*v, initial))
            .collect()
    }

    pub fn summary_stats(snapshot: &FunnelSnapshot) -> SummaryStats {
        let initial = snapshot.first();
        let final_value = snapshot.last();

        SummaryStats {
            initial,
            final_value,
            total_conversion_percent: percent_of(final_value, initial),
            total_loss: initial - final_value,
        }
    }

    /// Final-stage value averaged over the distinct dates in the dataset.
    pub fn average_per_day(dataset: &Dataset, snapshot: &FunnelSnapshot) -> f64 {
        let days = dataset.dates().len();
        if days == 0 {
            0.0
        } else {
            snapshot.last() / days as f64
        }
    }

    /// Compute one funnel per branch in parallel, in branch order.
    pub fn compare_branches(
        dataset: &Dataset,
        metric: Metric,
        date: Option<NaiveDate>,
    ) -> Vec<BranchFunnel> {
        dataset
            .branches()
            .into_par_iter()
            .map(|branch| {
                let snapshot =
                    Self::compute_funnel(dataset, metric, date, Some(branch.as_str()));
                let summary = Self::summary_stats(&snapshot);
                BranchFunnel {
                    branch,
                    snapshot,
                    summary,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, StageValues};

    const EPS: f64 = 1e-9;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn record(d: &str, branch: &str, counts: &[f64], tonnage: &[f64]) -> Record {
        Record {
            date: date(d),
            branch: branch.to_string(),
            values: counts
                .iter()
                .zip(tonnage)
                .map(|(c, t)| StageValues::new(*c, *t))
                .collect(),
        }
    }

    fn dataset(records: Vec<Record>) -> Dataset {
        Dataset::new(
            vec!["Cold".into(), "Meeting".into(), "Contract".into()],
            records,
        )
    }

    fn snapshot(values: &[f64]) -> FunnelSnapshot {
        FunnelSnapshot {
            metric: Metric::Count,
            stages: (0..values.len()).map(|i| format!("S{i}")).collect(),
            values: values.to_vec(),
            matched_records: 1,
            normalized: false,
        }
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < EPS, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_single_record_funnel() {
        let ds = dataset(vec![record(
            "2024-01-01",
            "A",
            &[100.0, 40.0, 10.0],
            &[0.0, 0.0, 0.0],
        )]);

        let snap = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, None);
        assert_close(&snap.values, &[100.0, 40.0, 10.0]);
        assert_eq!(snap.stages, vec!["Cold", "Meeting", "Contract"]);

        let conversions = FunnelCalculator::compute_conversions(&snap);
        assert_eq!(conversions.len(), 2);
        assert_eq!(conversions[0].from_stage, "Cold");
        assert_eq!(conversions[0].to_stage, "Meeting");
        assert!((conversions[0].rate_percent - 40.0).abs() < EPS);
        assert!((conversions[1].rate_percent - 25.0).abs() < EPS);

        let summary = FunnelCalculator::summary_stats(&snap);
        assert!((summary.initial - 100.0).abs() < EPS);
        assert!((summary.final_value - 10.0).abs() < EPS);
        assert!((summary.total_conversion_percent - 10.0).abs() < EPS);
        assert!((summary.total_loss - 90.0).abs() < EPS);
    }

    #[test]
    fn test_full_period_sums_all_branches() {
        let ds = dataset(vec![
            record("2024-01-01", "A", &[100.0, 40.0, 10.0], &[1.0, 2.0, 3.0]),
            record("2024-01-01", "B", &[50.0, 20.0, 5.0], &[0.5, 0.5, 0.5]),
        ]);

        let counts = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, None);
        assert_close(&counts.values, &[150.0, 60.0, 15.0]);
        assert_eq!(counts.matched_records, 2);

        let tonnage = FunnelCalculator::compute_funnel(&ds, Metric::Tonnage, None, None);
        assert_close(&tonnage.values, &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_filters_combine() {
        let ds = dataset(vec![
            record("2024-01-01", "A", &[10.0, 5.0, 1.0], &[0.0; 3]),
            record("2024-01-02", "A", &[20.0, 8.0, 2.0], &[0.0; 3]),
            record("2024-01-02", "B", &[30.0, 9.0, 3.0], &[0.0; 3]),
        ]);

        let by_date =
            FunnelCalculator::compute_funnel(&ds, Metric::Count, Some(date("2024-01-02")), None);
        assert_close(&by_date.values, &[50.0, 17.0, 5.0]);

        let by_branch = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, Some("A"));
        assert_close(&by_branch.values, &[30.0, 13.0, 3.0]);

        let both = FunnelCalculator::compute_funnel(
            &ds,
            Metric::Count,
            Some(date("2024-01-02")),
            Some("B"),
        );
        assert_close(&both.values, &[30.0, 9.0, 3.0]);
        assert_eq!(both.matched_records, 1);
    }

    #[test]
    fn test_unmatched_filter_is_zero_filled() {
        let ds = dataset(vec![record("2024-01-01", "A", &[10.0, 5.0, 1.0], &[0.0; 3])]);

        let snap = FunnelCalculator::compute_funnel(
            &ds,
            Metric::Count,
            Some(date("2030-01-01")),
            Some("Nowhere"),
        );
        assert_close(&snap.values, &[0.0, 0.0, 0.0]);
        assert!(snap.is_empty_result());
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn test_compute_funnel_is_repeatable() {
        let ds = dataset(vec![
            record("2024-01-01", "A", &[0.1, 0.2, 0.3], &[0.0; 3]),
            record("2024-01-02", "B", &[0.7, 0.1, 0.9], &[0.0; 3]),
        ]);
        let a = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, None);
        let b = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_initial_stage() {
        let snap = snapshot(&[0.0, 40.0, 10.0]);

        let rates: Vec<f64> = FunnelCalculator::compute_conversions(&snap)
            .iter()
            .map(|c| c.rate_percent)
            .collect();
        assert_close(&rates, &[0.0, 25.0]);

        let all_zero = snapshot(&[0.0, 0.0, 0.0]);
        let rates: Vec<f64> = FunnelCalculator::compute_conversions(&all_zero)
            .iter()
            .map(|c| c.rate_percent)
            .collect();
        assert_close(&rates, &[0.0, 0.0]);
        assert!(rates.iter().all(|r| !r.is_nan()));

        let summary = FunnelCalculator::summary_stats(&all_zero);
        assert_eq!(summary.total_conversion_percent, 0.0);
    }

    #[test]
    fn test_conversions_length() {
        for n in 0usize..6 {
            let values: Vec<f64> = (0..n).map(|i| (10 - i) as f64).collect();
            let conversions = FunnelCalculator::compute_conversions(&snapshot(&values));
            assert_eq!(conversions.len(), n.saturating_sub(1));
            assert!(conversions
                .iter()
                .all(|c| c.rate_percent >= 0.0 && c.rate_percent.is_finite()));
        }
    }

    #[test]
    fn test_normalize() {
        let normalized = FunnelCalculator::normalize(&snapshot(&[50.0, 200.0, 20.0]));
        assert_close(&normalized.values, &[25.0, 100.0, 10.0]);
        assert!(normalized.normalized);
        assert!((normalized.max() - 100.0).abs() < EPS);

        let zeros = FunnelCalculator::normalize(&snapshot(&[0.0, 0.0]));
        assert_close(&zeros.values, &[0.0, 0.0]);
    }

    #[test]
    fn test_run_applies_query() {
        let ds = dataset(vec![
            record("2024-01-01", "A", &[100.0, 40.0, 10.0], &[0.0; 3]),
            record("2024-01-01", "B", &[300.0, 60.0, 20.0], &[0.0; 3]),
        ]);

        let query = FunnelQuery::new(Metric::Count)
            .for_branch(Some("B".to_string()))
            .normalized(true);
        let snap = FunnelCalculator::run(&ds, &query);
        assert_close(&snap.values, &[100.0, 20.0, 100.0 * 20.0 / 300.0]);
        assert!(!query.is_full_period());
    }

    #[test]
    fn test_percent_of_initial() {
        let pct = FunnelCalculator::compute_percent_of_initial(&snapshot(&[200.0, 50.0, 10.0]));
        assert_close(&pct, &[25.0, 5.0]);

        let pct = FunnelCalculator::compute_percent_of_initial(&snapshot(&[0.0, 50.0]));
        assert_close(&pct, &[0.0]);

        assert!(FunnelCalculator::compute_percent_of_initial(&snapshot(&[7.0])).is_empty());
        assert!(FunnelCalculator::compute_percent_of_initial(&snapshot(&[])).is_empty());
    }

    #[test]
    fn test_non_monotonic_loss_is_not_clamped() {
        let summary = FunnelCalculator::summary_stats(&snapshot(&[10.0, 30.0, 25.0]));
        assert!((summary.total_loss + 15.0).abs() < EPS);
        assert!((summary.total_conversion_percent - 250.0).abs() < EPS);
    }

    #[test]
    fn test_degenerate_snapshots() {
        let single = FunnelCalculator::summary_stats(&snapshot(&[42.0]));
        assert_eq!(single.initial, 42.0);
        assert_eq!(single.final_value, 42.0);
        assert_eq!(single.total_loss, 0.0);
        assert!((single.total_conversion_percent - 100.0).abs() < EPS);

        let empty = FunnelCalculator::summary_stats(&snapshot(&[]));
        assert_eq!(empty, SummaryStats::default());
    }

    #[test]
    fn test_average_per_day() {
        let ds = dataset(vec![
            record("2024-01-01", "A", &[10.0, 5.0, 4.0], &[0.0; 3]),
            record("2024-01-02", "A", &[10.0, 5.0, 2.0], &[0.0; 3]),
            record("2024-01-02", "B", &[10.0, 5.0, 3.0], &[0.0; 3]),
        ]);
        let snap = FunnelCalculator::compute_funnel(&ds, Metric::Count, None, None);
        assert!((FunnelCalculator::average_per_day(&ds, &snap) - 4.5).abs() < EPS);

        let empty = dataset(vec![]);
        let snap = FunnelCalculator::compute_funnel(&empty, Metric::Count, None, None);
        assert_eq!(FunnelCalculator::average_per_day(&empty, &snap), 0.0);
    }

    #[test]
    fn test_compare_branches() {
        let ds = dataset(vec![
            record("2024-01-01", "North", &[10.0, 5.0, 1.0], &[0.0; 3]),
            record("2024-01-02", "North", &[10.0, 5.0, 1.0], &[0.0; 3]),
            record("2024-01-01", "East", &[40.0, 20.0, 8.0], &[0.0; 3]),
        ]);

        let branches = FunnelCalculator::compare_branches(&ds, Metric::Count, None);
        let names: Vec<&str> = branches.iter().map(|b| b.branch.as_str()).collect();
        assert_eq!(names, vec!["East", "North"]);
        assert_close(&branches[1].snapshot.values, &[20.0, 10.0, 2.0]);
        assert!((branches[0].summary.total_conversion_percent - 20.0).abs() < EPS);

        let on_day =
            FunnelCalculator::compare_branches(&ds, Metric::Count, Some(date("2024-01-02")));
        assert!(on_day[0].snapshot.is_empty_result());
        assert_close(&on_day[1].snapshot.values, &[10.0, 5.0, 1.0]);
    }
}
