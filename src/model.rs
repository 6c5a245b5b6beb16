/// Core data types for the bloom phenology analysis.
///
/// This module defines the shared domain model imported by all other modules:
/// raw observations, group keys, seasonal curves, per-group metrics, the
/// metrics table handed from extraction to trend testing, and trend results.
/// It contains no analysis logic, only types and their accessors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// A single concentration sample (chlorophyll-a, mg/m³) at one station.
///
/// Observations are immutable input; loading them from disk is the job of
/// whoever calls into this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub station_id: String,
    pub concentration: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, station_id: impl Into<String>, concentration: f64) -> Self {
        Self {
            date,
            station_id: station_id.into(),
            concentration,
        }
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Day of year, 1-based (1 = January 1st).
    pub fn day_of_year(&self) -> u32 {
        self.date.ordinal()
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Identifies one station/decade group.
///
/// Ordering is (decade, station) so that tables sort decade-major, the way
/// the trend analysis walks them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// 1-based decade index.
    pub decade: u8,
    pub station_id: String,
}

impl GroupKey {
    pub fn new(decade: u8, station_id: impl Into<String>) -> Self {
        Self {
            decade,
            station_id: station_id.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decade {}/{}", self.decade, self.station_id)
    }
}

// ---------------------------------------------------------------------------
// Seasonal curve
// ---------------------------------------------------------------------------

/// Smoothed, gap-free daily concentration curve for one group.
///
/// Keys are days of year. A curve produced by `analysis::curve::build_curve`
/// covers every integer day of the restriction window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalCurve {
    points: BTreeMap<u32, f64>,
}

impl SeasonalCurve {
    pub fn from_points(points: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }

    pub fn get(&self, day: u32) -> Option<f64> {
        self.points.get(&day).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_day(&self) -> Option<u32> {
        self.points.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<u32> {
        self.points.keys().next_back().copied()
    }

    /// Points in increasing day order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.points.iter().map(|(&day, &value)| (day, value))
    }

    pub fn days(&self) -> Vec<u32> {
        self.points.keys().copied().collect()
    }

    /// Points with `first <= day <= last`, in day order.
    pub fn window(&self, first: u32, last: u32) -> Vec<(u32, f64)> {
        if first > last {
            return Vec::new();
        }
        self.points
            .range(first..=last)
            .map(|(&day, &value)| (day, value))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Phenology metrics for one group.
///
/// `None` marks a metric that could not be derived (degenerate season-start
/// window, or no value crossing the threshold). It is never encoded as zero
/// or NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenologyMetrics {
    pub peak_doy: u32,
    pub peak_value: f64,
    /// Twice the bootstrap standard deviation of the peak day.
    pub peak_doy_uncertainty: f64,
    pub start_of_season_doy: Option<u32>,
    pub start_of_season_uncertainty: Option<f64>,
    pub amplitude: Option<f64>,
    pub area_under_curve: Option<f64>,
}

/// Which timing metric a correction or trend test refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimingMetric {
    PeakDoy,
    StartOfSeason,
}

impl TimingMetric {
    /// Day value and its uncertainty for this metric.
    pub fn read(&self, metrics: &PhenologyMetrics) -> (Option<u32>, Option<f64>) {
        match self {
            TimingMetric::PeakDoy => (
                Some(metrics.peak_doy),
                Some(metrics.peak_doy_uncertainty),
            ),
            TimingMetric::StartOfSeason => (
                metrics.start_of_season_doy,
                metrics.start_of_season_uncertainty,
            ),
        }
    }
}

impl fmt::Display for TimingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingMetric::PeakDoy => write!(f, "peak_doy"),
            TimingMetric::StartOfSeason => write!(f, "start_of_season_doy"),
        }
    }
}

/// One row of the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub key: GroupKey,
    pub metrics: PhenologyMetrics,
}

/// Ordered (group key → metrics) rows: the only hand-off between extraction
/// and trend testing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsTable {
    rows: Vec<MetricsRow>,
}

impl MetricsTable {
    /// Builds a table sorted by group key. A later row for the same key
    /// replaces an earlier one.
    pub fn from_rows(rows: impl IntoIterator<Item = MetricsRow>) -> Self {
        let by_key: BTreeMap<GroupKey, PhenologyMetrics> =
            rows.into_iter().map(|row| (row.key, row.metrics)).collect();
        Self {
            rows: by_key
                .into_iter()
                .map(|(key, metrics)| MetricsRow { key, metrics })
                .collect(),
        }
    }

    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&PhenologyMetrics> {
        self.rows
            .binary_search_by(|row| row.key.cmp(key))
            .ok()
            .map(|idx| &self.rows[idx].metrics)
    }

    /// Returns a copy of the table with `key`'s metrics replaced.
    /// Returns `None` if the key has no row.
    pub fn with_replaced(&self, key: &GroupKey, metrics: PhenologyMetrics) -> Option<Self> {
        let idx = self.rows.binary_search_by(|row| row.key.cmp(key)).ok()?;
        let mut rows = self.rows.clone();
        rows[idx].metrics = metrics;
        Some(Self { rows })
    }

    pub fn decades(&self) -> Vec<u8> {
        let mut decades: Vec<u8> = self.rows.iter().map(|row| row.key.decade).collect();
        decades.dedup();
        decades
    }

    /// Group keys whose metrics differ between `self` and `other`, including
    /// keys present in only one of the two tables.
    pub fn diff(&self, other: &MetricsTable) -> Vec<GroupKey> {
        let mut keys: Vec<GroupKey> = self
            .rows
            .iter()
            .chain(other.rows.iter())
            .map(|row| row.key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
            .filter(|key| self.get(key) != other.get(key))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Trend results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendMethod {
    /// Least squares on decade means.
    OrdinaryRegression,
    /// Inverse-variance weighted least squares on every group.
    WeightedRegression,
    /// Mann–Kendall tau on decade means, Sen's slope as the slope.
    MannKendallSen,
}

impl TrendMethod {
    pub const ALL: [TrendMethod; 3] = [
        TrendMethod::OrdinaryRegression,
        TrendMethod::WeightedRegression,
        TrendMethod::MannKendallSen,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrendMethod::OrdinaryRegression => "ordinary_linear_regression",
            TrendMethod::WeightedRegression => "weighted_linear_regression",
            TrendMethod::MannKendallSen => "mann_kendall_sen_slope",
        }
    }
}

impl fmt::Display for TrendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fitted statistics for one method.
///
/// For the regressions `intercept_or_tau` is the intercept and
/// `r_squared_or_equivalent` is R² (weighted R² for the weighted fit).
/// For Mann–Kendall they hold Kendall's tau and |tau|.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFit {
    /// Days per year.
    pub slope: f64,
    pub intercept_or_tau: f64,
    pub r_squared_or_equivalent: f64,
    pub p_value: f64,
    pub n_points: usize,
    pub significant_at_5pct: bool,
    pub significant_at_10pct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrendOutcome {
    Computed(TrendFit),
    NotComputed { reason: String },
}

/// Result of one trend method over one metric. Terminal output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub method: TrendMethod,
    pub metric: TimingMetric,
    pub outcome: TrendOutcome,
}

impl TrendResult {
    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    pub fn fit(&self) -> Option<&TrendFit> {
        match &self.outcome {
            TrendOutcome::Computed(fit) => Some(fit),
            TrendOutcome::NotComputed { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.fit().is_some()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while building curves, extracting metrics, or testing
/// trends. None of them is fatal to a run: the pipeline records them per
/// group or per method and carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhenologyError {
    /// The station/decade group has no usable observations.
    #[error("no observations for {0}")]
    MissingGroupData(GroupKey),

    /// A metric cannot be derived from the curve (e.g. degenerate window).
    #[error("metric {metric} undefined: {reason}")]
    UndefinedMetric { metric: String, reason: String },

    /// A trend method lacks enough usable points.
    #[error("{method} needs at least {required} usable points, got {available}")]
    InsufficientDataForMethod {
        method: TrendMethod,
        required: usize,
        available: usize,
    },

    /// A trend method's inputs are numerically degenerate.
    #[error("{method} is degenerate: {reason}")]
    DegenerateFit { method: TrendMethod, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to read configuration file {path}: {message}")]
    ConfigIo { path: String, message: String },

    #[error("unable to parse configuration: {0}")]
    ConfigParse(String),

    /// A correction names a group/value that is not in the table.
    #[error("correction for {key} not applicable: {reason}")]
    OverrideNotApplicable { key: GroupKey, reason: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(peak_doy: u32) -> PhenologyMetrics {
        PhenologyMetrics {
            peak_doy,
            peak_value: 12.5,
            peak_doy_uncertainty: 4.0,
            start_of_season_doy: Some(170),
            start_of_season_uncertainty: Some(3.0),
            amplitude: Some(8.0),
            area_under_curve: Some(900.0),
        }
    }

    #[test]
    fn test_observation_day_of_year_is_one_based() {
        let obs = Observation::new(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), "Zanka", 3.0);
        assert_eq!(obs.day_of_year(), 1);
        assert_eq!(obs.year(), 1990);

        let obs = Observation::new(NaiveDate::from_ymd_opt(1990, 12, 31).unwrap(), "Zanka", 3.0);
        assert_eq!(obs.day_of_year(), 365);
    }

    #[test]
    fn test_group_keys_sort_decade_major() {
        let mut keys = vec![
            GroupKey::new(2, "Keszthely"),
            GroupKey::new(1, "Zanka"),
            GroupKey::new(1, "Bfuzfo"),
        ];
        keys.sort();
        assert_eq!(keys[0], GroupKey::new(1, "Bfuzfo"));
        assert_eq!(keys[1], GroupKey::new(1, "Zanka"));
        assert_eq!(keys[2], GroupKey::new(2, "Keszthely"));
    }

    #[test]
    fn test_curve_window_is_inclusive_and_ordered() {
        let curve = SeasonalCurve::from_points((150..160).map(|d| (d, d as f64)));
        let window = curve.window(152, 154);
        assert_eq!(window, vec![(152, 152.0), (153, 153.0), (154, 154.0)]);
        assert!(curve.window(200, 210).is_empty());
        assert!(curve.window(155, 151).is_empty());
    }

    #[test]
    fn test_table_rows_are_sorted_and_deduplicated() {
        let table = MetricsTable::from_rows(vec![
            MetricsRow { key: GroupKey::new(2, "Zanka"), metrics: metrics(230) },
            MetricsRow { key: GroupKey::new(1, "Zanka"), metrics: metrics(240) },
            MetricsRow { key: GroupKey::new(2, "Zanka"), metrics: metrics(231) },
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].key.decade, 1);
        assert_eq!(table.get(&GroupKey::new(2, "Zanka")).unwrap().peak_doy, 231);
        assert_eq!(table.decades(), vec![1, 2]);
    }

    #[test]
    fn test_with_replaced_leaves_original_untouched() {
        let key = GroupKey::new(4, "Zanka");
        let table = MetricsTable::from_rows(vec![MetricsRow { key: key.clone(), metrics: metrics(279) }]);
        let corrected = table.with_replaced(&key, metrics(246)).unwrap();

        assert_eq!(table.get(&key).unwrap().peak_doy, 279);
        assert_eq!(corrected.get(&key).unwrap().peak_doy, 246);
        assert_eq!(table.diff(&corrected), vec![key]);
        assert!(table.with_replaced(&GroupKey::new(1, "Nowhere"), metrics(1)).is_none());
    }

    #[test]
    fn test_not_computed_result_has_no_fit() {
        let result = TrendResult {
            method: TrendMethod::WeightedRegression,
            metric: TimingMetric::PeakDoy,
            outcome: TrendOutcome::NotComputed { reason: "too few points".to_string() },
        };
        assert!(!result.is_computed());
        assert_eq!(result.method_name(), "weighted_linear_regression");
    }

    #[test]
    fn test_timing_metric_reads_matching_uncertainty() {
        let m = metrics(240);
        assert_eq!(TimingMetric::PeakDoy.read(&m), (Some(240), Some(4.0)));
        assert_eq!(TimingMetric::StartOfSeason.read(&m), (Some(170), Some(3.0)));
    }
}
