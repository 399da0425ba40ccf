//! Collaborator boundaries: rasters, regions, fetching and export

pub mod raster;
pub mod region;
pub mod fetch;
pub mod export;
#[cfg(feature = "gdal")]
pub mod geotiff;

pub use raster::{Band, GridGeometry, InMemoryTimeSeries, PixelAreaModel, RasterTimeSeries};
pub use region::RegionOfInterest;
pub use fetch::BandFetcher;
pub use export::{write_area_csv, write_area_csv_file};
#[cfg(feature = "gdal")]
pub use geotiff::GdalTimeSeries;
