/// Partitioning of the flat observation table into station/decade groups.

use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::logging::{self, Stage};
use crate::model::{GroupKey, Observation};
use crate::stations::STATION_REGISTRY;

/// Groups observations by (decade, station).
///
/// Observations from years past the last decade boundary are dropped, as are
/// samples with a negative or non-finite concentration. Within a group the
/// input order is preserved.
pub fn group_observations(
    observations: &[Observation],
    config: &AnalysisConfig,
) -> BTreeMap<GroupKey, Vec<Observation>> {
    let mut groups: BTreeMap<GroupKey, Vec<Observation>> = BTreeMap::new();
    let mut out_of_range = 0usize;
    let mut invalid = 0usize;

    for obs in observations {
        if !obs.concentration.is_finite() || obs.concentration < 0.0 {
            invalid += 1;
            continue;
        }
        let Some(decade) = config.decade_of_year(obs.year()) else {
            out_of_range += 1;
            continue;
        };
        groups
            .entry(GroupKey::new(decade, obs.station_id.clone()))
            .or_default()
            .push(obs.clone());
    }

    if out_of_range > 0 {
        logging::debug(
            Stage::Grouping,
            None,
            &format!("{} observations fall outside every decade", out_of_range),
        );
    }
    if invalid > 0 {
        logging::warn(
            Stage::Grouping,
            None,
            &format!("{} observations dropped for negative or non-finite concentration", invalid),
        );
    }

    groups
}

/// Every (decade, registered station) combination, in key order.
pub fn expected_groups(config: &AnalysisConfig) -> Vec<GroupKey> {
    let mut keys: Vec<GroupKey> = (1..=config.decade_count())
        .flat_map(|decade| STATION_REGISTRY.iter().map(move |s| GroupKey::new(decade, s.id)))
        .collect();
    keys.sort();
    keys
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
