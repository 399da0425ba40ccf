//! Multi-band classification GeoTIFFs read through GDAL

use crate::io::raster::{year_from_band_name, Band, GridGeometry, RasterTimeSeries};
use crate::types::{CodeGrid, Crs, GeoTransform, LandCoverError, LcResult, Year};
use gdal::{Dataset, Metadata};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Local raster whose band descriptions are `classification_<year>`.
///
/// Only metadata is kept; each `band` call reopens the file so the series
/// can be shared across threads.
#[derive(Debug, Clone)]
pub struct GdalTimeSeries {
    path: PathBuf,
    band_of_year: BTreeMap<Year, isize>,
    grid: GridGeometry,
}

impl GdalTimeSeries {
    /// Scan `path` for yearly bands. `crs` overrides the file's own CRS,
    /// which is required when the file carries no EPSG authority code.
    pub fn open<P: AsRef<Path>>(path: P, crs: Option<Crs>) -> LcResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::info!("Opening classification raster: {}", path.display());

        let dataset = Dataset::open(&path)?;
        let (width, height) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);

        let crs = match crs {
            Some(crs) => crs,
            None => {
                let code = dataset.spatial_ref()?.auth_code()?;
                let epsg = u32::try_from(code).map_err(|_| {
                    LandCoverError::Config(format!("Invalid EPSG code {} in {}", code, path.display()))
                })?;
                Crs::from_epsg(epsg)
            }
        };

        let mut band_of_year = BTreeMap::new();
        for index in 1..=dataset.raster_count() {
            let description = dataset.rasterband(index)?.description()?;
            match year_from_band_name(&description) {
                Some(year) => {
                    band_of_year.insert(year, index);
                }
                None => log::debug!("Ignoring band {} ({:?})", index, description),
            }
        }

        if band_of_year.is_empty() {
            return Err(LandCoverError::Config(format!(
                "{} has no classification_<year> bands",
                path.display()
            )));
        }

        log::debug!(
            "Raster {}x{} in {}, years {:?}",
            width,
            height,
            crs,
            band_of_year.keys().collect::<Vec<_>>()
        );

        Ok(Self {
            path,
            band_of_year,
            grid: GridGeometry::new(height, width, transform, crs),
        })
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }
}

impl RasterTimeSeries for GdalTimeSeries {
    fn years(&self) -> Vec<Year> {
        self.band_of_year.keys().copied().collect()
    }

    fn band(&self, year: Year) -> LcResult<Band> {
        let index = *self
            .band_of_year
            .get(&year)
            .ok_or(LandCoverError::DataUnavailable { year })?;
        let (rows, cols) = self.grid.shape();

        let dataset = Dataset::open(&self.path)?;
        let buffer = dataset
            .rasterband(index)?
            .read_as::<u16>((0, 0), (cols, rows), (cols, rows), None)?;

        let codes = CodeGrid::from_shape_vec((rows, cols), buffer.data)
            .map_err(|e| LandCoverError::Computation(format!("Failed to reshape band {}: {}", year, e)))?;
        Band::new(year, codes, self.grid.clone())
    }
}
