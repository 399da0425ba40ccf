//! landcover: reclassification, zonal area and trend engine
//!
//! Collapses raw land-cover codes (e.g. MapBiomas collections) into a small
//! set of classes, sums per-class area inside a region across a series of
//! yearly classification rasters, and fits linear trends to the result.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, ClassIndex, Crs, ErrorKind, GeoTransform, LandCoverError, LcResult, RawCode, Year,
};
pub use config::{CsvHeader, EngineConfig};

pub use io::{Band, GridGeometry, InMemoryTimeSeries, RasterTimeSeries, RegionOfInterest};
pub use crate::core::{
    AreaSeriesPipeline, AreaTable, ClassificationScheme, Metric, PartialResult, Reclassifier,
    TimeSeriesAnalyzer, TrendResult, UnmappedPolicy, ZonalAggregator,
};
