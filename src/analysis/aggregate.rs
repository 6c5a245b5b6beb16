/// Assembly of per-group metrics into the metrics table, and the audited
/// manual corrections applied to it before trend testing.
///
/// Corrections are data: each `MetricOverride` names the cell, the value
/// it replaces, the replacement, and why. Applying them yields a new table
/// plus an audit trail; the uncorrected table is never modified.

use serde::{Deserialize, Serialize};

use crate::logging::{self, Stage};
use crate::model::{GroupKey, MetricsRow, MetricsTable, PhenologyError, PhenologyMetrics, TimingMetric};

// ---------------------------------------------------------------------------
// Table assembly
// ---------------------------------------------------------------------------

/// Builds the metrics table from the groups that produced metrics.
pub fn assemble(results: impl IntoIterator<Item = (GroupKey, PhenologyMetrics)>) -> MetricsTable {
    MetricsTable::from_rows(
        results
            .into_iter()
            .map(|(key, metrics)| MetricsRow { key, metrics }),
    )
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// A single externally validated replacement for one timing cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOverride {
    pub key: GroupKey,
    pub field: TimingMetric,
    /// Only apply when the automated value equals this day.
    pub expected_original: Option<u32>,
    pub replacement_doy: u32,
    pub replacement_uncertainty: f64,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverrideStatus {
    Applied {
        original_doy: Option<u32>,
        original_uncertainty: Option<f64>,
    },
    NotApplied {
        reason: String,
    },
}

/// What happened to one override, kept alongside the corrected table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideAudit {
    pub correction: MetricOverride,
    pub status: OverrideStatus,
}

impl OverrideAudit {
    pub fn was_applied(&self) -> bool {
        matches!(self.status, OverrideStatus::Applied { .. })
    }
}

/// The published correction for Lake Balaton.
///
/// The satellite-derived 2015–2023 peak at Zanka (station III) lands on day
/// 279, far outside the other stations. In-situ sampling for that decade
/// places the peak at day 246 ± 3.2.
pub fn lake_balaton_overrides() -> Vec<MetricOverride> {
    vec![MetricOverride {
        key: GroupKey::new(4, "Zanka"),
        field: TimingMetric::PeakDoy,
        expected_original: Some(279),
        replacement_doy: 246,
        replacement_uncertainty: 3.2,
        justification: "satellite peak for station III (2015-2023) replaced by \
                        in-situ validated peak day 246 ± 3.2"
            .to_string(),
    }]
}

fn apply_one(table: &MetricsTable, correction: &MetricOverride) -> Result<(MetricsTable, OverrideStatus), PhenologyError> {
    let not_applicable = |reason: String| PhenologyError::OverrideNotApplicable {
        key: correction.key.clone(),
        reason,
    };

    let current = table
        .get(&correction.key)
        .ok_or_else(|| not_applicable("group has no metrics row".to_string()))?;
    let (original_doy, original_uncertainty) = correction.field.read(current);

    if let Some(expected) = correction.expected_original {
        if original_doy != Some(expected) {
            return Err(not_applicable(format!(
                "{} is {:?}, expected {}",
                correction.field, original_doy, expected
            )));
        }
    }
    if !(correction.replacement_uncertainty.is_finite() && correction.replacement_uncertainty >= 0.0) {
        return Err(not_applicable(format!(
            "replacement uncertainty {} is not a non-negative number",
            correction.replacement_uncertainty
        )));
    }

    let mut replaced = current.clone();
    match correction.field {
        TimingMetric::PeakDoy => {
            replaced.peak_doy = correction.replacement_doy;
            replaced.peak_doy_uncertainty = correction.replacement_uncertainty;
        }
        TimingMetric::StartOfSeason => {
            replaced.start_of_season_doy = Some(correction.replacement_doy);
            replaced.start_of_season_uncertainty = Some(correction.replacement_uncertainty);
        }
    }

    let corrected = table
        .with_replaced(&correction.key, replaced)
        .ok_or_else(|| not_applicable("group vanished from table".to_string()))?;
    Ok((
        corrected,
        OverrideStatus::Applied {
            original_doy,
            original_uncertainty,
        },
    ))
}

/// Applies `overrides` in order, returning the corrected table and one
/// audit entry per override. Overrides that do not match are reported and
/// skipped.
pub fn apply_overrides(table: &MetricsTable, overrides: &[MetricOverride]) -> (MetricsTable, Vec<OverrideAudit>) {
    let mut corrected = table.clone();
    let mut audit = Vec::with_capacity(overrides.len());

    for correction in overrides {
        let status = match apply_one(&corrected, correction) {
            Ok((next, status)) => {
                if let OverrideStatus::Applied { original_doy, original_uncertainty } = &status {
                    logging::info(
                        Stage::Aggregate,
                        Some(&correction.key),
                        &format!(
                            "override {}: {:?} ± {:?} -> {} ± {} ({})",
                            correction.field,
                            original_doy,
                            original_uncertainty,
                            correction.replacement_doy,
                            correction.replacement_uncertainty,
                            correction.justification
                        ),
                    );
                }
                corrected = next;
                status
            }
            Err(err) => {
                logging::log_failure(Stage::Aggregate, Some(&correction.key), "override", &err);
                OverrideStatus::NotApplied {
                    reason: err.to_string(),
                }
            }
        };
        audit.push(OverrideAudit {
            correction: correction.clone(),
            status,
        });
    }

    (corrected, audit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(peak_doy: u32, peak_unc: f64) -> PhenologyMetrics {
        PhenologyMetrics {
            peak_doy,
            peak_value: 10.0,
            peak_doy_uncertainty: peak_unc,
            start_of_season_doy: Some(180),
            start_of_season_uncertainty: Some(5.0),
            amplitude: Some(7.0),
            area_under_curve: Some(600.0),
        }
    }

    fn table() -> MetricsTable {
        assemble(vec![
            (GroupKey::new(4, "Zanka"), metrics(279, 12.0)),
            (GroupKey::new(4, "Tihany"), metrics(244, 6.0)),
            (GroupKey::new(3, "Zanka"), metrics(250, 4.0)),
        ])
    }

    #[test]
    fn test_published_override_changes_exactly_one_cell() {
        let raw = table();
        let (corrected, audit) = apply_overrides(&raw, &lake_balaton_overrides());

        let key = GroupKey::new(4, "Zanka");
        assert_eq!(raw.diff(&corrected), vec![key.clone()]);
        let fixed = corrected.get(&key).unwrap();
        assert_eq!(fixed.peak_doy, 246);
        assert_eq!(fixed.peak_doy_uncertainty, 3.2);
        assert_eq!(fixed.start_of_season_doy, Some(180), "other fields untouched");

        // The automated value survives both in the raw table and the audit.
        assert_eq!(raw.get(&key).unwrap().peak_doy, 279);
        assert_eq!(audit.len(), 1);
        assert_eq!(
            audit[0].status,
            OverrideStatus::Applied { original_doy: Some(279), original_uncertainty: Some(12.0) }
        );
    }

    #[test]
    fn test_override_skipped_when_original_differs() {
        let raw = assemble(vec![(GroupKey::new(4, "Zanka"), metrics(251, 5.0))]);
        let (corrected, audit) = apply_overrides(&raw, &lake_balaton_overrides());
        assert_eq!(corrected, raw);
        assert!(!audit[0].was_applied());
    }

    #[test]
    fn test_override_skipped_when_group_missing() {
        let raw = assemble(vec![(GroupKey::new(1, "Keszthely"), metrics(230, 5.0))]);
        let (corrected, audit) = apply_overrides(&raw, &lake_balaton_overrides());
        assert_eq!(corrected, raw);
        match &audit[0].status {
            OverrideStatus::NotApplied { reason } => assert!(reason.contains("no metrics row")),
            other => panic!("expected NotApplied, got {:?}", other),
        }
    }

    #[test]
    fn test_season_start_override() {
        let raw = table();
        let correction = MetricOverride {
            key: GroupKey::new(3, "Zanka"),
            field: TimingMetric::StartOfSeason,
            expected_original: None,
            replacement_doy: 175,
            replacement_uncertainty: 2.0,
            justification: "test".to_string(),
        };
        let (corrected, audit) = apply_overrides(&raw, &[correction]);
        let fixed = corrected.get(&GroupKey::new(3, "Zanka")).unwrap();
        assert_eq!(fixed.start_of_season_doy, Some(175));
        assert_eq!(fixed.start_of_season_uncertainty, Some(2.0));
        assert_eq!(fixed.peak_doy, 250);
        assert!(audit[0].was_applied());
    }

    #[test]
    fn test_no_overrides_is_identity() {
        let raw = table();
        let (corrected, audit) = apply_overrides(&raw, &[]);
        assert_eq!(corrected, raw);
        assert!(audit.is_empty());
    }
}
