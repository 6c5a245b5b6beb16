/// Phenology metrics from a seasonal curve: peak timing and height,
/// start of season, amplitude, and area under the curve.
///
/// Uncertainty fields are left at their neutral values here and filled in
/// by `analysis::bootstrap`.

use crate::config::AnalysisConfig;
use crate::model::{PhenologyError, PhenologyMetrics, SeasonalCurve};

/// Threshold statistics over the season-start window.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonStart {
    pub min: f64,
    pub max: f64,
    pub amplitude: f64,
    pub threshold: f64,
    /// First day strictly above `threshold`.
    pub day: Option<u32>,
}

/// Day and value of the curve maximum. Ties go to the earliest day.
pub fn find_peak(points: &[(u32, f64)]) -> Option<(u32, f64)> {
    argmax(points.iter().map(|&(_, v)| v)).map(|idx| points[idx])
}

/// Index of the first maximum. NaN values never win.
pub fn argmax(values: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in values.into_iter().enumerate() {
        match best {
            Some((_, current)) if !(value > current) => {}
            _ if value.is_nan() => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// `min + fraction × (max − min)` over `values`, or `None` for fewer than
/// two values.
pub fn crossing_threshold(values: &[f64], fraction: f64) -> Option<(f64, f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max, min + fraction * (max - min)))
}

/// First day whose value is strictly above `threshold`.
pub fn first_crossing(points: impl IntoIterator<Item = (u32, f64)>, threshold: f64) -> Option<u32> {
    points
        .into_iter()
        .find(|&(_, value)| value > threshold)
        .map(|(day, _)| day)
}

/// Season-start statistics for the points of the season-start window.
/// `None` when the window holds fewer than two points.
pub fn season_start(window: &[(u32, f64)], fraction: f64) -> Option<SeasonStart> {
    let values: Vec<f64> = window.iter().map(|&(_, v)| v).collect();
    let (min, max, threshold) = crossing_threshold(&values, fraction)?;
    Some(SeasonStart {
        min,
        max,
        amplitude: max - min,
        threshold,
        day: first_crossing(window.iter().copied(), threshold),
    })
}

/// Trapezoidal integral of value over day.
pub fn trapezoid(points: &[(u32, f64)]) -> f64 {
    points
        .windows(2)
        .map(|pair| {
            let (d0, v0) = pair[0];
            let (d1, v1) = pair[1];
            (d1 as f64 - d0 as f64) * (v0 + v1) / 2.0
        })
        .sum()
}

/// Computes every deterministic metric for one curve.
///
/// Only an empty curve is an error; a degenerate season-start window leaves
/// amplitude, season start, and area absent.
pub fn extract_metrics(
    curve: &SeasonalCurve,
    config: &AnalysisConfig,
) -> Result<PhenologyMetrics, PhenologyError> {
    let points: Vec<(u32, f64)> = curve.iter().collect();
    let (peak_doy, peak_value) = find_peak(&points).ok_or_else(|| PhenologyError::UndefinedMetric {
        metric: "peak_doy".to_string(),
        reason: "curve has no finite values".to_string(),
    })?;

    let (first, last) = config.season_start_window;
    let window = curve.window(first, last);
    let start = season_start(&window, config.season_start_fraction);

    let sos = start.as_ref().and_then(|s| s.day);
    let area_under_curve = sos.map(|sos_day| {
        let span: Vec<(u32, f64)> = window
            .iter()
            .copied()
            .filter(|&(day, _)| day >= sos_day && day <= last)
            .collect();
        trapezoid(&span)
    });

    Ok(PhenologyMetrics {
        peak_doy,
        peak_value,
        peak_doy_uncertainty: 0.0,
        start_of_season_doy: sos,
        start_of_season_uncertainty: None,
        amplitude: start.map(|s| s.amplitude),
        area_under_curve,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
