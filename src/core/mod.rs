//! Core land-cover computation modules

pub mod scheme;
pub mod presets;
pub mod partial;
pub mod reclassify;
pub mod zonal;
pub mod trend;
pub mod report;
pub mod pipeline;

// Re-export main types
pub use scheme::{ClassificationScheme, SchemeSpec, UnmappedPolicy};
pub use partial::{PartialResult, YearFailure};
pub use reclassify::{reclassify, reclassify_many, Reclassifier, RemappedBand};
pub use zonal::{compute_area_by_class, compute_area_series, MaskCache, RegionMask, ZonalAggregator, ZonalAreaResult};
pub use trend::{Descriptive, TimeSeriesAnalyzer, TrendResult};
pub use report::{AreaRow, AreaTable, Metric, TrendReport};
pub use pipeline::AreaSeriesPipeline;
