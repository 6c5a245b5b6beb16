/// Bloom phenology of Lake Balaton from decades of irregular station samples.
///
/// Per station and decade, concentration samples become a smoothed daily
/// seasonal curve, from which peak timing, season start, amplitude, and area
/// are extracted with bootstrap uncertainties. The resulting metrics table is
/// corrected by explicit, audited overrides and tested for a trend across
/// decades with ordinary regression, weighted regression, and
/// Mann–Kendall/Sen's slope.
///
/// ```rust,ignore
/// use bloom_phenology::analysis::aggregate::lake_balaton_overrides;
/// use bloom_phenology::analysis::pipeline;
/// use bloom_phenology::config::AnalysisConfig;
///
/// let config = AnalysisConfig::load("phenology.toml")?;
/// let run = pipeline::run(&observations, &config, &lake_balaton_overrides())?;
/// for result in &run.peak_trends {
///     println!("{}: {:?}", result.method, result.outcome);
/// }
/// ```

pub mod analysis;
pub mod config;
pub mod logging;
pub mod model;
pub mod stations;
