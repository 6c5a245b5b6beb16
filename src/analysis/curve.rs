/// Seasonal curve construction.
///
/// Turns the irregular samples of one station/decade group into a daily
/// curve:
///
/// 1. average all samples sharing a day of year,
/// 2. lay them on the full 1..=365 day grid,
/// 3. fill gaps by linear interpolation, holding the first/last defined value
///    flat outside the sampled span,
/// 4. keep the restriction window,
/// 5. smooth with a centered moving average.

use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::model::{GroupKey, Observation, PhenologyError, SeasonalCurve};

/// Last day of the daily grid. Day 366 of leap years falls off the grid.
pub const LAST_GRID_DAY: u32 = 365;

/// Builds the smoothed seasonal curve for one group.
///
/// Fails with `MissingGroupData` when no observation lands on the day grid.
pub fn build_curve(
    key: &GroupKey,
    observations: &[Observation],
    config: &AnalysisConfig,
) -> Result<SeasonalCurve, PhenologyError> {
    let daily_means = daily_means(observations);
    let grid = interpolate_grid(&daily_means)
        .ok_or_else(|| PhenologyError::MissingGroupData(key.clone()))?;

    let (start, end) = config.restriction_window;
    let restricted: Vec<(u32, f64)> = grid
        .into_iter()
        .filter(|(day, _)| (start..end).contains(day))
        .collect();

    let values: Vec<f64> = restricted.iter().map(|&(_, v)| v).collect();
    let smoothed = centered_rolling_mean(&values, config.smoothing_window);

    Ok(SeasonalCurve::from_points(
        restricted.into_iter().map(|(day, _)| day).zip(smoothed),
    ))
}

/// Mean concentration per day of year, for days on the grid.
pub fn daily_means(observations: &[Observation]) -> BTreeMap<u32, f64> {
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for obs in observations {
        let day = obs.day_of_year();
        if day > LAST_GRID_DAY {
            continue;
        }
        let entry = sums.entry(day).or_insert((0.0, 0));
        entry.0 += obs.concentration;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(day, (sum, count))| (day, sum / count as f64))
        .collect()
}

/// Fills every day 1..=365 from the sparse daily means.
///
/// Returns `None` when `defined` is empty.
pub fn interpolate_grid(defined: &BTreeMap<u32, f64>) -> Option<Vec<(u32, f64)>> {
    let (&first_day, &first_value) = defined.iter().next()?;
    let (&last_day, &last_value) = defined.iter().next_back()?;

    let grid = (1..=LAST_GRID_DAY)
        .map(|day| {
            let value = if day <= first_day {
                first_value
            } else if day >= last_day {
                last_value
            } else if let Some(&v) = defined.get(&day) {
                v
            } else {
                // Both neighbours exist since first_day < day < last_day.
                let (&d0, &v0) = defined.range(..day).next_back().unwrap_or((&first_day, &first_value));
                let (&d1, &v1) = defined.range(day..).next().unwrap_or((&last_day, &last_value));
                let t = (day - d0) as f64 / (d1 - d0) as f64;
                v0 + t * (v1 - v0)
            };
            (day, value)
        })
        .collect();
    Some(grid)
}

/// Centered moving average over positions.
///
/// Position `i` averages `values[i - window/2 ..= i + (window - 1 - window/2)]`,
/// clipped to the slice, so windows at either edge hold fewer points instead
/// of being padded. With an even window the extra point sits before `i`.
pub fn centered_rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || window == 0 {
        return values.to_vec();
    }
    let before = window / 2;
    let after = window - 1 - before;

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(n);
            let slice = &values[lo..hi];
            // Summing offsets from the centre value keeps constant runs exact.
            let centre = values[i];
            centre + slice.iter().map(|v| v - centre).sum::<f64>() / slice.len() as f64
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
