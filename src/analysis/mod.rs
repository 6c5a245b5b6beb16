/// Phenology analysis for station/decade groups.
///
/// Submodules, in pipeline order:
/// - `groupings`: partitions the flat observation table by decade and station.
/// - `curve`: builds the smoothed, gap-filled daily seasonal curve.
/// - `phenology`: peak, season start, amplitude and area from a curve.
/// - `bootstrap`: resampling uncertainty for the two timing metrics.
/// - `aggregate`: the metrics table and its audited manual corrections.
/// - `trend`: the three decade trend tests.
/// - `pipeline`: runs all of the above over one closed dataset.

pub mod aggregate;
pub mod bootstrap;
pub mod curve;
pub mod groupings;
pub mod phenology;
pub mod pipeline;
pub mod trend;
