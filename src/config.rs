/// Analysis parameters.
///
/// Every window size, threshold, and resampling count used by the pipeline
/// lives in [`AnalysisConfig`], which is passed explicitly into each stage.
/// The defaults reproduce the published Lake Balaton analysis; a TOML file
/// may override any subset of keys.
///
/// ```toml
/// smoothing_window = 30
/// bootstrap_iterations = 500
/// seed = 42
/// decade_boundaries = [1995, 2005, 2015, 2024]
/// decade_mid_years = [1989, 1999, 2009, 2019]
/// ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::PhenologyError;

/// How the Mann–Kendall p-value is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KendallPValue {
    /// Exact for tie-free series of at most 33 points (or when at most one
    /// pair is out of order), normal approximation otherwise.
    #[default]
    Auto,
    /// Normal approximation with tie-corrected variance of S.
    Asymptotic,
    /// Exact permutation distribution; falls back to the normal
    /// approximation when either series has ties.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Centered moving-average window, in days.
    pub smoothing_window: usize,
    /// Inclusive day range used for season start, amplitude and AUC.
    pub season_start_window: (u32, u32),
    /// Half-open day range `[start, end)` kept after interpolation.
    pub restriction_window: (u32, u32),
    /// Fraction of the amplitude above the minimum that marks season start.
    pub season_start_fraction: f64,
    pub bootstrap_iterations: usize,
    /// Days either side of the peak used by the peak-day subsampling.
    pub peak_uncertainty_half_window: usize,
    /// Peak uncertainty is this many standard deviations.
    pub peak_uncertainty_scale: f64,
    /// Season-start uncertainty is this many standard deviations.
    pub sos_uncertainty_scale: f64,
    /// Exclusive upper year of each decade, ascending. Decade 1 has no
    /// lower bound.
    pub decade_boundaries: Vec<i32>,
    /// Representative year of each decade, used as the regression abscissa.
    pub decade_mid_years: Vec<i32>,
    pub significance_level: f64,
    pub relaxed_significance_level: f64,
    pub kendall_p_value: KendallPValue,
    /// Run-wide RNG seed. Drawn once from the OS when absent.
    pub seed: Option<u64>,
    /// Fan station/decade groups out across worker threads.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 30,
            season_start_window: (120, 304),
            restriction_window: (150, 290),
            season_start_fraction: 0.2,
            bootstrap_iterations: 1000,
            peak_uncertainty_half_window: 20,
            peak_uncertainty_scale: 2.0,
            sos_uncertainty_scale: 1.0,
            decade_boundaries: vec![1995, 2005, 2015, 2024],
            decade_mid_years: vec![1989, 1999, 2009, 2019],
            significance_level: 0.05,
            relaxed_significance_level: 0.10,
            kendall_p_value: KendallPValue::Auto,
            seed: None,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Parses a TOML document. Missing keys keep their default values.
    pub fn from_toml_str(text: &str) -> Result<Self, PhenologyError> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| PhenologyError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhenologyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PhenologyError::ConfigIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), PhenologyError> {
        let invalid = |msg: String| Err(PhenologyError::InvalidConfig(msg));

        if self.smoothing_window == 0 {
            return invalid("smoothing_window must be at least 1".to_string());
        }
        let (restrict_start, restrict_end) = self.restriction_window;
        if restrict_start == 0
            || restrict_end > 366
            || restrict_start.checked_add(2).is_none_or(|min_end| restrict_end < min_end)
        {
            return invalid(format!(
                "restriction_window [{}, {}) must span at least 2 days within 1..=365",
                restrict_start, restrict_end
            ));
        }
        let (season_first, season_last) = self.season_start_window;
        if season_first > season_last {
            return invalid(format!(
                "season_start_window ({}, {}) is inverted",
                season_first, season_last
            ));
        }
        if !(0.0..=1.0).contains(&self.season_start_fraction) {
            return invalid(format!(
                "season_start_fraction {} must lie in [0, 1]",
                self.season_start_fraction
            ));
        }
        if self.bootstrap_iterations == 0 {
            return invalid("bootstrap_iterations must be at least 1".to_string());
        }
        if self.peak_uncertainty_half_window == 0 {
            return invalid("peak_uncertainty_half_window must be at least 1".to_string());
        }
        if self.peak_uncertainty_scale < 0.0 || self.sos_uncertainty_scale < 0.0 {
            return invalid("uncertainty scales must be non-negative".to_string());
        }
        if self.decade_boundaries.is_empty() || self.decade_boundaries.len() > u8::MAX as usize {
            return invalid("decade_boundaries must list between 1 and 255 cutoffs".to_string());
        }
        if self.decade_boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!(
                "decade_boundaries {:?} must be strictly ascending",
                self.decade_boundaries
            ));
        }
        if self.decade_mid_years.len() != self.decade_boundaries.len() {
            return invalid(format!(
                "{} decade_mid_years given for {} decades",
                self.decade_mid_years.len(),
                self.decade_boundaries.len()
            ));
        }
        for level in [self.significance_level, self.relaxed_significance_level] {
            if !(level > 0.0 && level < 1.0) {
                return invalid(format!("significance level {} must lie in (0, 1)", level));
            }
        }
        Ok(())
    }

    pub fn decade_count(&self) -> u8 {
        self.decade_boundaries.len() as u8
    }

    /// 1-based decade index for a calendar year, or `None` past the last
    /// boundary.
    pub fn decade_of_year(&self, year: i32) -> Option<u8> {
        self.decade_boundaries
            .iter()
            .position(|&cutoff| year < cutoff)
            .map(|idx| idx as u8 + 1)
    }

    pub fn mid_year(&self, decade: u8) -> Option<i32> {
        let idx = (decade as usize).checked_sub(1)?;
        self.decade_mid_years.get(idx).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
