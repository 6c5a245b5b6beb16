/// Resampling estimates of timing uncertainty.
///
/// The two timing metrics are resampled differently:
///
/// * **Season start**: the season-start window is drawn *with* replacement
///   at full size, re-sorted by day, re-smoothed, and the threshold crossing
///   is searched again. The spread is reported as one standard deviation.
/// * **Peak day**: a window of ±`peak_uncertainty_half_window` days around
///   the peak is subsampled *without* replacement at half its size and the
///   maximum is located among the drawn days. The spread is reported as two
///   standard deviations.
///
/// Iterations that yield no statistic are dropped before the spread is
/// computed. All randomness comes from the caller's RNG so a run seeded once
/// is reproducible.

use rand::Rng;
use rand::seq::index;

use crate::analysis::curve::centered_rolling_mean;
use crate::analysis::phenology::{argmax, crossing_threshold, first_crossing};
use crate::config::AnalysisConfig;
use crate::model::{PhenologyMetrics, SeasonalCurve};

/// Spread of one resampled statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapEstimate {
    /// Scaled standard deviation, `None` if no iteration produced a value.
    pub uncertainty: Option<f64>,
    pub iterations: usize,
    pub valid_iterations: usize,
}

impl BootstrapEstimate {
    /// One entry per iteration; `None` marks an iteration with no statistic,
    /// which is left out of the spread.
    fn from_draws(draws: impl IntoIterator<Item = Option<f64>>, scale: f64) -> Self {
        let mut iterations = 0;
        let mut valid = Vec::new();
        for draw in draws {
            iterations += 1;
            valid.extend(draw);
        }
        Self {
            uncertainty: population_std(&valid).map(|std| scale * std),
            iterations,
            valid_iterations: valid.len(),
        }
    }
}

/// Standard deviation with divisor `n`. `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Peak-day uncertainty by half-size subsampling around the peak.
pub fn peak_uncertainty<R: Rng + ?Sized>(
    curve: &SeasonalCurve,
    config: &AnalysisConfig,
    rng: &mut R,
) -> BootstrapEstimate {
    let points: Vec<(u32, f64)> = curve.iter().collect();
    let iterations = config.bootstrap_iterations;
    let Some(peak_idx) = argmax(points.iter().map(|&(_, v)| v)) else {
        return BootstrapEstimate::from_draws(vec![None; iterations], config.peak_uncertainty_scale);
    };

    let half = config.peak_uncertainty_half_window;
    let start = peak_idx.saturating_sub(half);
    let end = (peak_idx + half + 1).min(points.len());
    let window = &points[start..end];
    let draw = (window.len() / 2).max(1);

    let peak_days = (0..iterations).map(|_| {
        let mut picked = index::sample(&mut *rng, window.len(), draw).into_vec();
        picked.sort_unstable();
        argmax(picked.iter().map(|&i| window[i].1)).map(|best| window[picked[best]].0 as f64)
    });

    BootstrapEstimate::from_draws(peak_days, config.peak_uncertainty_scale)
}

/// Season-start uncertainty by full with-replacement resampling of the
/// season-start window.
///
/// Each draw is smoothed again with the configured window to set the
/// threshold; the crossing is then searched among the drawn curve values.
pub fn sos_uncertainty<R: Rng + ?Sized>(
    curve: &SeasonalCurve,
    config: &AnalysisConfig,
    rng: &mut R,
) -> BootstrapEstimate {
    let (first, last) = config.season_start_window;
    let window = curve.window(first, last);
    let n = window.len();
    let iterations = config.bootstrap_iterations;

    let starts = (0..iterations).map(|_| {
        if n == 0 {
            return None;
        }
        let mut picked: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        // The window is in day order, so index order is day order.
        picked.sort_unstable();
        let sample: Vec<(u32, f64)> = picked.iter().map(|&i| window[i]).collect();
        let values: Vec<f64> = sample.iter().map(|&(_, v)| v).collect();
        let smoothed = centered_rolling_mean(&values, config.smoothing_window);

        let (_, _, threshold) = crossing_threshold(&smoothed, config.season_start_fraction)?;
        first_crossing(sample, threshold).map(|day| day as f64)
    });

    BootstrapEstimate::from_draws(starts, config.sos_uncertainty_scale)
}

/// Returns a copy of `metrics` with both uncertainty fields filled.
pub fn with_uncertainties<R: Rng + ?Sized>(
    metrics: &PhenologyMetrics,
    curve: &SeasonalCurve,
    config: &AnalysisConfig,
    rng: &mut R,
) -> PhenologyMetrics {
    let peak = peak_uncertainty(curve, config, rng);
    let sos = sos_uncertainty(curve, config, rng);
    PhenologyMetrics {
        peak_doy_uncertainty: peak.uncertainty.unwrap_or(0.0),
        start_of_season_uncertainty: sos.uncertainty,
        ..metrics.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::phenology::extract_metrics;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bloom_curve() -> SeasonalCurve {
        // Gaussian bloom centred on day 215 over a low baseline.
        SeasonalCurve::from_points(
            (150..290).map(|d| (d, 2.0 + 20.0 * (-((d as f64 - 215.0) / 18.0).powi(2)).exp())),
        )
    }

    #[test]
    fn test_population_std() {
        assert_eq!(population_std(&[]), None);
        assert_eq!(population_std(&[5.0]), Some(0.0));
        assert_eq!(population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
    }

    #[test]
    fn test_undefined_draws_are_left_out_of_the_spread() {
        let estimate = BootstrapEstimate::from_draws(vec![Some(1.0), None, Some(3.0), None], 1.0);
        assert_eq!(estimate.iterations, 4);
        assert_eq!(estimate.valid_iterations, 2);
        assert_eq!(estimate.uncertainty, Some(1.0), "std of 1 and 3 only, not of 0, 1, 0, 3");

        let none = BootstrapEstimate::from_draws(vec![None; 3], 2.0);
        assert_eq!(none.uncertainty, None);
        assert_eq!(none.iterations, 3);
    }

    #[test]
    fn test_sos_draws_without_crossing_are_excluded() {
        // Three-day window rising 1 -> 5 -> 9. A draw of one repeated day is
        // flat and never crosses; every other draw starts on day 151 or 152.
        let curve = SeasonalCurve::from_points(vec![(150, 1.0), (151, 5.0), (152, 9.0)]);
        let config = AnalysisConfig {
            smoothing_window: 1,
            bootstrap_iterations: 400,
            ..AnalysisConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(21);

        let sos = sos_uncertainty(&curve, &config, &mut rng);
        assert_eq!(sos.iterations, 400);
        assert!(sos.valid_iterations < sos.iterations, "some flat draws expected");
        assert!(sos.valid_iterations > 0);
        // Days in {151, 152} spread by at most 0.5; counting flat draws as
        // day 0 would put the spread near 50.
        let spread = sos.uncertainty.unwrap();
        assert!(spread > 0.0 && spread <= 0.5, "spread {}", spread);
    }

    #[test]
    fn test_uncertainties_are_non_negative() {
        let config = AnalysisConfig { bootstrap_iterations: 200, ..AnalysisConfig::default() };
        let mut rng = StdRng::seed_from_u64(11);
        let curve = bloom_curve();

        let peak = peak_uncertainty(&curve, &config, &mut rng);
        let sos = sos_uncertainty(&curve, &config, &mut rng);
        assert!(peak.uncertainty.unwrap() >= 0.0);
        assert!(sos.uncertainty.unwrap() >= 0.0);
        assert_eq!(peak.valid_iterations, 200);
    }

    #[test]
    fn test_single_iteration_is_defined_and_degenerate() {
        let config = AnalysisConfig { bootstrap_iterations: 1, ..AnalysisConfig::default() };
        let mut rng = StdRng::seed_from_u64(3);
        let curve = bloom_curve();

        let peak = peak_uncertainty(&curve, &config, &mut rng);
        assert_eq!(peak.uncertainty, Some(0.0));
        let sos = sos_uncertainty(&curve, &config, &mut rng);
        assert!(matches!(sos.uncertainty, Some(u) if u == 0.0));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let config = AnalysisConfig { bootstrap_iterations: 300, ..AnalysisConfig::default() };
        let curve = bloom_curve();

        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let metrics = extract_metrics(&curve, &config).unwrap();
            with_uncertainties(&metrics, &curve, &config, &mut rng)
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_flat_curve_has_no_sos_uncertainty() {
        let config = AnalysisConfig { bootstrap_iterations: 50, ..AnalysisConfig::default() };
        let curve = SeasonalCurve::from_points((150..290).map(|d| (d, 1.5)));
        let mut rng = StdRng::seed_from_u64(5);

        let sos = sos_uncertainty(&curve, &config, &mut rng);
        assert_eq!(sos.uncertainty, None);
        assert_eq!(sos.valid_iterations, 0);

        // Every subsample of a flat window peaks at its first drawn day, so
        // the peak spread stays finite.
        let peak = peak_uncertainty(&curve, &config, &mut rng);
        assert!(peak.uncertainty.unwrap().is_finite());
    }

    #[test]
    fn test_peak_draws_stay_inside_window() {
        let config = AnalysisConfig { bootstrap_iterations: 500, ..AnalysisConfig::default() };
        let mut rng = StdRng::seed_from_u64(9);
        let peak = peak_uncertainty(&bloom_curve(), &config, &mut rng);
        // Days are confined to 215 ± 20, so 2σ can never exceed the window width.
        assert!(peak.uncertainty.unwrap() <= 40.0);
    }

    #[test]
    fn test_single_point_curve_has_zero_peak_spread() {
        let config = AnalysisConfig { bootstrap_iterations: 10, ..AnalysisConfig::default() };
        let curve = SeasonalCurve::from_points(vec![(200, 3.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(peak_uncertainty(&curve, &config, &mut rng).uncertainty, Some(0.0));
        assert_eq!(sos_uncertainty(&curve, &config, &mut rng).uncertainty, None);
    }
}
