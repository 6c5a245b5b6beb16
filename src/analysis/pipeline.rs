/// End-to-end run over a closed observation set.
///
/// ```text
/// observations ─► groupings ─► per group: curve ─► phenology ─► bootstrap
///                                                   │
///                       (join) ◄────────────────────┘
///                          │
///                 aggregate::assemble ─► apply_overrides ─► trend::analyze
/// ```
///
/// Groups are independent; with `config.parallel` they run on the rayon
/// pool. Each group draws from its own RNG seeded from the run seed and its
/// key, so results do not depend on scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::aggregate::{self, MetricOverride, OverrideAudit};
use crate::analysis::bootstrap::with_uncertainties;
use crate::analysis::curve::build_curve;
use crate::analysis::groupings::{expected_groups, group_observations};
use crate::analysis::phenology::extract_metrics;
use crate::analysis::trend;
use crate::config::AnalysisConfig;
use crate::logging::{self, Stage};
use crate::model::{
    GroupKey, MetricsTable, Observation, PhenologyError, PhenologyMetrics, SeasonalCurve, TimingMetric,
    TrendResult,
};
use crate::stations::find_station;

/// A group that produced no metrics, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedGroup {
    pub key: GroupKey,
    /// Stage the group stopped at.
    pub stage: Stage,
    pub reason: String,
}

/// Why `process_group` stopped, tagged with the stage that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFailure {
    pub stage: Stage,
    pub error: PhenologyError,
}

impl GroupFailure {
    fn logged(stage: Stage, key: &GroupKey, operation: &str, error: PhenologyError) -> Self {
        logging::log_failure(stage, Some(key), operation, &error);
        Self { stage, error }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCurve {
    pub key: GroupKey,
    pub curve: SeasonalCurve,
}

/// Everything a run hands to reporting and plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenologyRun {
    /// Seed the group RNGs were derived from.
    pub seed: u64,
    pub curves: Vec<GroupCurve>,
    pub skipped: Vec<SkippedGroup>,
    /// Metrics exactly as extracted.
    pub raw_table: MetricsTable,
    /// `raw_table` with the applied overrides.
    pub corrected_table: MetricsTable,
    pub override_audit: Vec<OverrideAudit>,
    /// Trend tests on peak timing over `corrected_table`.
    pub peak_trends: Vec<TrendResult>,
    /// Trend tests on season start over `corrected_table`.
    pub sos_trends: Vec<TrendResult>,
}

impl PhenologyRun {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// SplitMix64 finaliser.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable per-group seed derived from the run seed.
pub fn group_seed(run_seed: u64, key: &GroupKey) -> u64 {
    let mut state = mix(run_seed ^ key.decade as u64);
    for byte in key.station_id.bytes() {
        state = mix(state ^ byte as u64);
    }
    state
}

/// Curve, metrics, and uncertainties for one group. A failure is logged
/// under the stage that produced it.
pub fn process_group(
    key: &GroupKey,
    observations: &[Observation],
    config: &AnalysisConfig,
    run_seed: u64,
) -> Result<(SeasonalCurve, PhenologyMetrics), GroupFailure> {
    if observations.is_empty() {
        return Err(GroupFailure::logged(
            Stage::Grouping,
            key,
            "group",
            PhenologyError::MissingGroupData(key.clone()),
        ));
    }
    let curve = build_curve(key, observations, config)
        .map_err(|err| GroupFailure::logged(Stage::Curve, key, "build_curve", err))?;
    logging::debug(
        Stage::Curve,
        Some(key),
        &format!("{} observations -> {} curve days", observations.len(), curve.len()),
    );

    let metrics = extract_metrics(&curve, config)
        .map_err(|err| GroupFailure::logged(Stage::Phenology, key, "extract_metrics", err))?;
    if metrics.start_of_season_doy.is_none() {
        logging::warn(Stage::Phenology, Some(key), "no season start; amplitude/AUC may be absent");
    }

    let mut rng = StdRng::seed_from_u64(group_seed(run_seed, key));
    let metrics = with_uncertainties(&metrics, &curve, config, &mut rng);
    logging::debug(
        Stage::Bootstrap,
        Some(key),
        &format!(
            "peak {} ± {:.2}, sos {:?} ± {:?}",
            metrics.peak_doy,
            metrics.peak_doy_uncertainty,
            metrics.start_of_season_doy,
            metrics.start_of_season_uncertainty
        ),
    );
    Ok((curve, metrics))
}

/// Runs the complete analysis.
///
/// Only an invalid configuration is an error. Groups without data and
/// methods without enough points are reported inside the returned run.
pub fn run(
    observations: &[Observation],
    config: &AnalysisConfig,
    overrides: &[MetricOverride],
) -> Result<PhenologyRun, PhenologyError> {
    if let Err(err) = config.validate() {
        logging::log_failure(Stage::Config, None, "validate", &err);
        return Err(err);
    }
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    logging::info(Stage::System, None, &format!("run seed {}", seed));

    let groups = group_observations(observations, config);
    let mut keys = expected_groups(config);
    for key in groups.keys() {
        if find_station(&key.station_id).is_none() {
            logging::warn(Stage::Grouping, Some(key), "station is not in the registry");
        }
        keys.push(key.clone());
    }
    keys.sort();
    keys.dedup();

    let process = |key: &GroupKey| {
        let group = groups.get(key).map(Vec::as_slice).unwrap_or(&[]);
        (key.clone(), process_group(key, group, config, seed))
    };
    let outcomes: Vec<(GroupKey, Result<(SeasonalCurve, PhenologyMetrics), GroupFailure>)> =
        if config.parallel {
            keys.par_iter().map(process).collect()
        } else {
            keys.iter().map(process).collect()
        };

    let mut curves = Vec::new();
    let mut computed = Vec::new();
    let mut skipped = Vec::new();
    for (key, outcome) in outcomes {
        match outcome {
            Ok((curve, metrics)) => {
                curves.push(GroupCurve { key: key.clone(), curve });
                computed.push((key, metrics));
            }
            Err(failure) => skipped.push(SkippedGroup {
                key,
                stage: failure.stage,
                reason: failure.error.to_string(),
            }),
        }
    }
    logging::log_run_summary(computed.len() + skipped.len(), computed.len(), skipped.len());

    let raw_table = aggregate::assemble(computed);
    let (corrected_table, override_audit) = aggregate::apply_overrides(&raw_table, overrides);

    let peak_trends = trend::analyze(&corrected_table, TimingMetric::PeakDoy, config);
    let sos_trends = trend::analyze(&corrected_table, TimingMetric::StartOfSeason, config);

    Ok(PhenologyRun {
        seed,
        curves,
        skipped,
        raw_table,
        corrected_table,
        override_audit,
        peak_trends,
        sos_trends,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bloom(station: &str, year: i32, peak: f64) -> Vec<Observation> {
        (140..300)
            .step_by(5)
            .map(|doy| {
                let value = 3.0 + 15.0 * (-((doy as f64 - peak) / 15.0).powi(2)).exp();
                Observation::new(NaiveDate::from_yo_opt(year, doy).unwrap(), station, value)
            })
            .collect()
    }

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            bootstrap_iterations: 50,
            seed: Some(17),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_group_seed_is_stable_and_key_specific() {
        let a = GroupKey::new(1, "Zanka");
        let b = GroupKey::new(2, "Zanka");
        assert_eq!(group_seed(5, &a), group_seed(5, &a));
        assert_ne!(group_seed(5, &a), group_seed(5, &b));
        assert_ne!(group_seed(5, &a), group_seed(6, &a));
    }

    #[test]
    fn test_missing_groups_are_skipped_not_fatal() {
        let observations = bloom("Zanka", 1990, 220.0);
        let run = run(&observations, &small_config(), &[]).unwrap();

        assert_eq!(run.raw_table.len(), 1);
        assert_eq!(run.skipped.len(), 19);
        assert!(run.skipped.iter().all(|s| s.key != GroupKey::new(1, "Zanka")));
        assert_eq!(run.peak_trends.len(), 3);
        assert!(run.peak_trends.iter().all(|t| !t.is_computed()), "one decade is not a trend");
    }

    #[test]
    fn test_group_failures_carry_their_stage() {
        let key = GroupKey::new(2, "Tihany");
        let empty = process_group(&key, &[], &small_config(), 1).unwrap_err();
        assert_eq!(empty.stage, Stage::Grouping);
        assert_eq!(empty.error, PhenologyError::MissingGroupData(key.clone()));

        // Two maxima on one day overflow the daily mean; smoothing then
        // leaves no finite value to take a peak from.
        let date = NaiveDate::from_yo_opt(2000, 200).unwrap();
        let overflow = vec![
            Observation::new(date, "Tihany", f64::MAX),
            Observation::new(date, "Tihany", f64::MAX),
        ];
        let failure = process_group(&key, &overflow, &small_config(), 1).unwrap_err();
        assert_eq!(failure.stage, Stage::Phenology);
        assert!(matches!(failure.error, PhenologyError::UndefinedMetric { .. }));

        let run = run(&overflow, &small_config(), &[]).unwrap();
        let skipped = run.skipped.iter().find(|s| s.key == key).unwrap();
        assert_eq!(skipped.stage, Stage::Phenology);
        let missing = run.skipped.iter().find(|s| s.key == GroupKey::new(1, "Zanka")).unwrap();
        assert_eq!(missing.stage, Stage::Grouping);
    }

    #[test]
    fn test_parallel_and_serial_runs_agree() {
        let mut observations = Vec::new();
        for (i, station) in ["Keszthely", "Zanka", "Bfuzfo"].iter().enumerate() {
            observations.extend(bloom(station, 1990, 230.0 + i as f64));
            observations.extend(bloom(station, 2010, 220.0 + i as f64));
        }
        let serial = run(&observations, &AnalysisConfig { parallel: false, ..small_config() }, &[]).unwrap();
        let parallel = run(&observations, &AnalysisConfig { parallel: true, ..small_config() }, &[]).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_unregistered_station_is_still_processed() {
        let observations = bloom("Siofok", 2000, 210.0);
        let run = run(&observations, &small_config(), &[]).unwrap();
        assert!(run.raw_table.get(&GroupKey::new(2, "Siofok")).is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AnalysisConfig { smoothing_window: 0, ..small_config() };
        assert!(matches!(run(&[], &config, &[]), Err(PhenologyError::InvalidConfig(_))));
    }

    #[test]
    fn test_run_serialises_to_json() {
        let run = run(&bloom("Tihany", 2020, 240.0), &small_config(), &[]).unwrap();
        let json = run.to_json().unwrap();
        assert!(json.contains("\"peak_trends\""));
        assert!(json.contains("Tihany"));
        let back: PhenologyRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed, run.seed);
        assert_eq!(back.raw_table.len(), run.raw_table.len());
        assert_eq!(back.raw_table.rows()[0].metrics.peak_doy, run.raw_table.rows()[0].metrics.peak_doy);
    }
}
