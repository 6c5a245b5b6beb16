/// Temporal trend tests over a timing metric across decades.
///
/// Three independent methods, always all reported:
///
/// | method | points | slope | significance |
/// |---|---|---|---|
/// | ordinary regression | decade means vs mid-year | least squares | t-test on r, df = n − 2 |
/// | weighted regression | every group vs its mid-year, weight 1/σ² | weighted least squares | t-test on slope / σ_slope, df = n − 2 |
/// | Mann–Kendall + Sen | decade means vs mid-year | median pairwise slope | Kendall tau-b |
///
/// A method that cannot run yields `TrendOutcome::NotComputed` with the
/// reason; the others are unaffected.

use itertools::Itertools;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::config::{AnalysisConfig, KendallPValue};
use crate::logging::{self, Stage};
use crate::model::{
    MetricsTable, PhenologyError, TimingMetric, TrendFit, TrendMethod, TrendOutcome, TrendResult,
};

/// Weighted regression needs this many measurements with an uncertainty.
pub const MIN_WEIGHTED_POINTS: usize = 4;
/// Decade-mean methods need this many decades with a value.
pub const MIN_DECADE_POINTS: usize = 2;
/// Largest tie-free sample `KendallPValue::Auto` still tests exactly.
pub const MAX_EXACT_KENDALL_POINTS: usize = 33;

// ---------------------------------------------------------------------------
// Fits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KendallTest {
    /// Kendall's tau-b.
    pub tau: f64,
    /// Concordant minus discordant pairs.
    pub s: i64,
    pub p_value: f64,
    pub n: usize,
}

fn degenerate(method: TrendMethod, reason: impl Into<String>) -> PhenologyError {
    PhenologyError::DegenerateFit {
        method,
        reason: reason.into(),
    }
}

fn insufficient(method: TrendMethod, required: usize, available: usize) -> PhenologyError {
    PhenologyError::InsufficientDataForMethod {
        method,
        required,
        available,
    }
}

/// Two-sided p-value of a t statistic.
fn student_t_two_sided(t: f64, df: f64, method: TrendMethod) -> Result<f64, PhenologyError> {
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| degenerate(method, e.to_string()))?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

fn normal_two_sided(z: f64, method: TrendMethod) -> Result<f64, PhenologyError> {
    let dist = Normal::new(0.0, 1.0).map_err(|e| degenerate(method, e.to_string()))?;
    Ok((2.0 * dist.sf(z.abs())).min(1.0))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Least-squares line with the correlation t-test for slope ≠ 0.
///
/// With exactly two points the fit is exact; the p-value is 1 for equal
/// ordinates and 0 otherwise.
pub fn ordinary_least_squares(xs: &[f64], ys: &[f64]) -> Result<LinearFit, PhenologyError> {
    let method = TrendMethod::OrdinaryRegression;
    let n = xs.len().min(ys.len());
    if n < MIN_DECADE_POINTS {
        return Err(insufficient(method, MIN_DECADE_POINTS, n));
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let syy: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    if sxx == 0.0 {
        return Err(degenerate(method, "all abscissae are equal"));
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let r = if syy == 0.0 {
        0.0
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    };

    let p_value = if n == 2 {
        if ys[0] == ys[1] { 1.0 } else { 0.0 }
    } else if r.abs() >= 1.0 {
        0.0
    } else {
        let df = (n - 2) as f64;
        let t = r * (df / ((1.0 - r) * (1.0 + r))).sqrt();
        student_t_two_sided(t, df, method)?
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared: r * r,
        p_value,
        n,
    })
}

/// Weighted least squares with weights `1/σ²` and absolute uncertainties:
/// the slope variance is taken from the weights alone, not rescaled by the
/// residuals.
pub fn weighted_least_squares(xs: &[f64], ys: &[f64], sigmas: &[f64]) -> Result<LinearFit, PhenologyError> {
    let method = TrendMethod::WeightedRegression;
    let n = xs.len().min(ys.len()).min(sigmas.len());
    if n < MIN_WEIGHTED_POINTS {
        return Err(insufficient(method, MIN_WEIGHTED_POINTS, n));
    }
    if let Some(bad) = sigmas[..n].iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(degenerate(method, format!("uncertainty {} is not positive", bad)));
    }

    let weights: Vec<f64> = sigmas[..n].iter().map(|s| 1.0 / (s * s)).collect();
    let w_sum: f64 = weights.iter().sum();
    let x_mean = weights.iter().zip(xs).map(|(w, x)| w * x).sum::<f64>() / w_sum;
    let y_mean = weights.iter().zip(ys).map(|(w, y)| w * y).sum::<f64>() / w_sum;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = xs[i] - x_mean;
        sxx += weights[i] * dx * dx;
        sxy += weights[i] * dx * (ys[i] - y_mean);
    }
    if sxx == 0.0 {
        return Err(degenerate(method, "all abscissae are equal"));
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let predicted = slope * xs[i] + intercept;
        ss_res += weights[i] * (ys[i] - predicted).powi(2);
        ss_tot += weights[i] * (ys[i] - y_mean).powi(2);
    }
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let slope_std = (1.0 / sxx).sqrt();
    let t = slope / slope_std;
    let p_value = student_t_two_sided(t, (n - 2) as f64, method)?;

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
        p_value,
        n,
    })
}

/// Sizes of groups of equal values.
fn tie_groups(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
        .chunk_by(|a, b| a == b)
        .map(|chunk| chunk.len())
        .filter(|&len| len > 1)
        .collect()
}

/// Probability that a random permutation of `n` items has at most `c`
/// inversions.
fn inversion_cdf(n: usize, c: usize) -> f64 {
    let max_inversions = n * n.saturating_sub(1) / 2;
    let mut dist = vec![0.0; max_inversions + 1];
    dist[0] = 1.0;
    for k in 2..=n {
        let mut next = vec![0.0; max_inversions + 1];
        for (j, slot) in next.iter_mut().enumerate() {
            let lo = j.saturating_sub(k - 1);
            *slot = dist[lo..=j].iter().sum::<f64>() / k as f64;
        }
        dist = next;
    }
    dist[..=c.min(max_inversions)].iter().sum()
}

/// Kendall's tau-b between `xs` and `ys` with a two-sided p-value.
pub fn mann_kendall(xs: &[f64], ys: &[f64], mode: KendallPValue) -> Result<KendallTest, PhenologyError> {
    let method = TrendMethod::MannKendallSen;
    let n = xs.len().min(ys.len());
    if n < MIN_DECADE_POINTS {
        return Err(insufficient(method, MIN_DECADE_POINTS, n));
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let s: i64 = (0..n)
        .tuple_combinations()
        .map(|(i, j)| {
            let dx = xs[j] - xs[i];
            let dy = ys[j] - ys[i];
            (sign(dx) * sign(dy)) as i64
        })
        .sum();

    let x_ties = tie_groups(xs);
    let y_ties = tie_groups(ys);
    let pairs = |ties: &[usize]| ties.iter().map(|&t| (t * (t - 1) / 2) as f64).sum::<f64>();
    let total = (n * (n - 1) / 2) as f64;
    let denom = ((total - pairs(&x_ties)) * (total - pairs(&y_ties))).sqrt();
    if denom == 0.0 {
        return Err(degenerate(method, "one series is constant"));
    }
    let tau = s as f64 / denom;

    let tie_free = x_ties.is_empty() && y_ties.is_empty();
    let discordant = ((total as i64 - s) / 2) as usize;
    let c = discordant.min(total as usize - discordant);
    let exact = match mode {
        KendallPValue::Asymptotic => false,
        KendallPValue::Exact => tie_free,
        KendallPValue::Auto => tie_free && (n <= MAX_EXACT_KENDALL_POINTS || c <= 1),
    };
    if mode == KendallPValue::Exact && !exact {
        logging::debug(Stage::Trend, None, "ties present; Kendall p-value uses the normal approximation");
    }

    let p_value = if exact {
        (2.0 * inversion_cdf(n, c)).min(1.0)
    } else {
        let nf = n as f64;
        let m = nf * (nf - 1.0);
        let t1 = |ties: &[usize]| -> f64 {
            ties.iter()
                .map(|&t| t as f64)
                .map(|t| t * (t - 1.0) * (2.0 * t + 5.0))
                .sum()
        };
        let t2 = |ties: &[usize]| -> f64 {
            ties.iter()
                .map(|&t| t as f64)
                .map(|t| t * (t - 1.0) * (t - 2.0))
                .sum()
        };
        let mut var_s = (m * (2.0 * nf + 5.0) - t1(&x_ties) - t1(&y_ties)) / 18.0
            + 2.0 * pairs(&x_ties) * pairs(&y_ties) / m;
        if n > 2 {
            var_s += t2(&x_ties) * t2(&y_ties) / (9.0 * m * (nf - 2.0));
        }
        if var_s <= 0.0 {
            return Err(degenerate(method, "variance of S is zero"));
        }
        normal_two_sided(s as f64 / var_s.sqrt(), method)?
    };

    Ok(KendallTest { tau, s, p_value, n })
}

fn sign(v: f64) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Median of all pairwise slopes over pairs with distinct abscissae.
pub fn sens_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    let mut slopes: Vec<f64> = (0..n)
        .tuple_combinations()
        .filter(|&(i, j)| xs[j] != xs[i])
        .map(|(i, j)| (ys[j] - ys[i]) / (xs[j] - xs[i]))
        .collect();
    if slopes.is_empty() {
        return None;
    }
    slopes.sort_by(f64::total_cmp);
    let mid = slopes.len() / 2;
    Some(if slopes.len() % 2 == 0 {
        (slopes[mid - 1] + slopes[mid]) / 2.0
    } else {
        slopes[mid]
    })
}

// ---------------------------------------------------------------------------
// Inputs from the metrics table
// ---------------------------------------------------------------------------

/// (mid-year, mean metric value) per decade that has at least one value.
pub fn decade_means(table: &MetricsTable, metric: TimingMetric, config: &AnalysisConfig) -> Vec<(f64, f64)> {
    (1..=config.decade_count())
        .filter_map(|decade| {
            let values: Vec<f64> = table
                .rows()
                .iter()
                .filter(|row| row.key.decade == decade)
                .filter_map(|row| metric.read(&row.metrics).0)
                .map(|day| day as f64)
                .collect();
            if values.is_empty() {
                return None;
            }
            Some((config.mid_year(decade)? as f64, mean(&values)))
        })
        .collect()
}

/// (mid-year, value, uncertainty) for every group with a value and a
/// positive uncertainty.
pub fn weighted_points(table: &MetricsTable, metric: TimingMetric, config: &AnalysisConfig) -> Vec<(f64, f64, f64)> {
    table
        .rows()
        .iter()
        .filter_map(|row| {
            let (day, sigma) = metric.read(&row.metrics);
            let sigma = sigma.filter(|s| s.is_finite() && *s > 0.0)?;
            let year = config.mid_year(row.key.decade)?;
            Some((year as f64, day? as f64, sigma))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

fn fit_from(slope: f64, intercept_or_tau: f64, r2: f64, p_value: f64, n: usize, config: &AnalysisConfig) -> TrendFit {
    TrendFit {
        slope,
        intercept_or_tau,
        r_squared_or_equivalent: r2,
        p_value,
        n_points: n,
        significant_at_5pct: p_value < config.significance_level,
        significant_at_10pct: p_value < config.relaxed_significance_level,
    }
}

fn run_method(
    method: TrendMethod,
    table: &MetricsTable,
    metric: TimingMetric,
    config: &AnalysisConfig,
) -> Result<TrendFit, PhenologyError> {
    match method {
        TrendMethod::OrdinaryRegression => {
            let (xs, ys): (Vec<f64>, Vec<f64>) = decade_means(table, metric, config).into_iter().unzip();
            let fit = ordinary_least_squares(&xs, &ys)?;
            Ok(fit_from(fit.slope, fit.intercept, fit.r_squared, fit.p_value, fit.n, config))
        }
        TrendMethod::WeightedRegression => {
            let points = weighted_points(table, metric, config);
            let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
            let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
            let sigmas: Vec<f64> = points.iter().map(|p| p.2).collect();
            let fit = weighted_least_squares(&xs, &ys, &sigmas)?;
            Ok(fit_from(fit.slope, fit.intercept, fit.r_squared, fit.p_value, fit.n, config))
        }
        TrendMethod::MannKendallSen => {
            let (xs, ys): (Vec<f64>, Vec<f64>) = decade_means(table, metric, config).into_iter().unzip();
            let test = mann_kendall(&xs, &ys, config.kendall_p_value)?;
            let slope = sens_slope(&xs, &ys).ok_or_else(|| degenerate(method, "no pair with distinct years"))?;
            Ok(fit_from(slope, test.tau, test.tau.abs(), test.p_value, test.n, config))
        }
    }
}

/// Runs all three methods over `metric`. Always returns one result per
/// method, in `TrendMethod::ALL` order.
pub fn analyze(table: &MetricsTable, metric: TimingMetric, config: &AnalysisConfig) -> Vec<TrendResult> {
    TrendMethod::ALL
        .iter()
        .map(|&method| {
            let outcome = match run_method(method, table, metric, config) {
                Ok(fit) => {
                    logging::info(
                        Stage::Trend,
                        None,
                        &format!(
                            "{} on {}: slope {:.3} days/year, p = {:.6} (n = {})",
                            method, metric, fit.slope, fit.p_value, fit.n_points
                        ),
                    );
                    TrendOutcome::Computed(fit)
                }
                Err(err) => {
                    logging::log_failure(Stage::Trend, None, method.name(), &err);
                    TrendOutcome::NotComputed {
                        reason: err.to_string(),
                    }
                }
            };
            TrendResult { method, metric, outcome }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
