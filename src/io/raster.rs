//! Classification rasters consumed by the engine
//!
//! A [`Band`] is one year of raw land-cover codes together with the grid
//! geometry needed to turn pixels into ground area. A [`RasterTimeSeries`]
//! hands out bands by year; the engine never mutates it.

use crate::types::{CodeGrid, Crs, GeoTransform, LandCoverError, LcResult, RawCode, Year};
use ndarray::Array2;
use num_traits::ToPrimitive;
use std::collections::BTreeMap;

/// Sphere radius in metres (WGS84 semi-major axis)
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Prefix of per-year band names in multi-band classification products
pub const BAND_NAME_PREFIX: &str = "classification_";

/// Band name used for a given year, e.g. `classification_2020`
pub fn band_name_for_year(year: Year) -> String {
    format!("{}{}", BAND_NAME_PREFIX, year)
}

/// Year encoded in a band name, if it follows the `classification_<year>` convention
pub fn year_from_band_name(name: &str) -> Option<Year> {
    name.strip_prefix(BAND_NAME_PREFIX)?.parse::<Year>().ok()
}

/// How ground area is derived for each pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelAreaModel {
    /// Every pixel covers the same area, in m²
    Uniform(f64),
    /// Projected CRS in metres: area from the geotransform determinant
    Projected,
    /// Lon/lat degrees: spherical cell area, varies with latitude
    Geographic,
}

/// Shape and georeferencing of a classification grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    crs: Crs,
    area_model: PixelAreaModel,
}

impl GridGeometry {
    /// Grid whose pixel area follows from the CRS kind
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: Crs) -> Self {
        let area_model = if crs.is_geographic() {
            PixelAreaModel::Geographic
        } else {
            PixelAreaModel::Projected
        };
        Self { rows, cols, transform, crs, area_model }
    }

    /// Override the area model with a constant per-pixel area
    pub fn with_uniform_pixel_area(mut self, area_m2: f64) -> Self {
        self.area_model = PixelAreaModel::Uniform(area_m2);
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn area_model(&self) -> PixelAreaModel {
        self.area_model
    }

    /// Ground area of pixel (row, col) in m²
    pub fn pixel_area_m2(&self, row: usize, col: usize) -> f64 {
        let gt = &self.transform;
        match self.area_model {
            PixelAreaModel::Uniform(area) => area,
            PixelAreaModel::Projected => {
                (gt.pixel_width * gt.pixel_height - gt.rotation_x * gt.rotation_y).abs()
            }
            PixelAreaModel::Geographic => {
                let (_, lat_center) = gt.pixel_center(row, col);
                let half_height = gt.pixel_height.abs() / 2.0;
                let lat_north = (lat_center + half_height).clamp(-90.0, 90.0).to_radians();
                let lat_south = (lat_center - half_height).clamp(-90.0, 90.0).to_radians();
                let d_lon = gt.pixel_width.abs().to_radians();
                EARTH_RADIUS_M * EARTH_RADIUS_M * d_lon * (lat_north.sin() - lat_south.sin()).abs()
            }
        }
    }

    /// Pixel area per row, valid when area does not vary along a row
    pub fn row_areas_m2(&self) -> Option<Vec<f64>> {
        if self.transform.has_rotation() {
            return None;
        }
        Some((0..self.rows).map(|row| self.pixel_area_m2(row, 0)).collect())
    }
}

/// One year of raw classification codes
#[derive(Debug, Clone)]
pub struct Band {
    year: Year,
    codes: CodeGrid,
    grid: GridGeometry,
}

impl Band {
    pub fn new(year: Year, codes: CodeGrid, grid: GridGeometry) -> LcResult<Self> {
        if codes.dim() != grid.shape() {
            return Err(LandCoverError::Config(format!(
                "Band {} has shape {:?} but its grid geometry is {:?}",
                year,
                codes.dim(),
                grid.shape()
            )));
        }
        Ok(Self { year, codes, grid })
    }

    /// Build a band from any integer grid, rejecting values outside the raw code range
    pub fn from_raw<T>(year: Year, values: &Array2<T>, grid: GridGeometry) -> LcResult<Self>
    where
        T: ToPrimitive + Copy,
    {
        let mut codes = CodeGrid::zeros(values.dim());
        for ((row, col), value) in values.indexed_iter() {
            codes[[row, col]] = value.to_u16().ok_or_else(|| {
                LandCoverError::Config(format!(
                    "Value at ({}, {}) of band {} is not a valid land-cover code",
                    row, col, year
                ))
            })?;
        }
        Self::new(year, codes, grid)
    }

    pub fn year(&self) -> Year {
        self.year
    }

    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    pub fn value_at(&self, row: usize, col: usize) -> Option<RawCode> {
        self.codes.get([row, col]).copied()
    }

    pub fn pixel_area_m2(&self, row: usize, col: usize) -> f64 {
        self.grid.pixel_area_m2(row, col)
    }

    pub fn codes(&self) -> &CodeGrid {
        &self.codes
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }
}

/// Source of yearly classification bands
pub trait RasterTimeSeries: Send + Sync {
    /// Years available in the series, ascending
    fn years(&self) -> Vec<Year>;

    /// Band for `year`; fails with `DataUnavailable` when the year is absent
    fn band(&self, year: Year) -> LcResult<Band>;
}

/// Series held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTimeSeries {
    bands: BTreeMap<Year, Band>,
}

impl InMemoryTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bands<I: IntoIterator<Item = Band>>(bands: I) -> Self {
        let bands = bands.into_iter().map(|band| (band.year(), band)).collect();
        Self { bands }
    }

    pub fn insert(&mut self, band: Band) -> Option<Band> {
        self.bands.insert(band.year(), band)
    }
}

impl RasterTimeSeries for InMemoryTimeSeries {
    fn years(&self) -> Vec<Year> {
        self.bands.keys().copied().collect()
    }

    fn band(&self, year: Year) -> LcResult<Band> {
        self.bands
            .get(&year)
            .cloned()
            .ok_or(LandCoverError::DataUnavailable { year })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_names() {
        assert_eq!(band_name_for_year(1985), "classification_1985");
        assert_eq!(year_from_band_name("classification_2023"), Some(2023));
        assert_eq!(year_from_band_name("remapped_2023"), None);
    }

    #[test]
    fn test_projected_pixel_area() {
        let grid = GridGeometry::new(4, 4, GeoTransform::north_up(0.0, 120.0, 30.0, -30.0), Crs::from_epsg(31983));
        assert_relative_eq!(grid.pixel_area_m2(2, 3), 900.0);
    }

    #[test]
    fn test_geographic_pixel_area_shrinks_with_latitude() {
        // 1 degree cells at the equator and at 60 degrees south
        let equator = GridGeometry::new(1, 1, GeoTransform::north_up(0.0, 0.5, 1.0, -1.0), Crs::WGS84);
        let south = GridGeometry::new(1, 1, GeoTransform::north_up(0.0, -59.5, 1.0, -1.0), Crs::WGS84);

        let a_eq = equator.pixel_area_m2(0, 0);
        let a_south = south.pixel_area_m2(0, 0);

        // roughly 111.3 km x 111.3 km at the equator
        assert_relative_eq!(a_eq / 1e6, 12_392.0, max_relative = 0.005);
        assert_relative_eq!(a_south / a_eq, 60f64.to_radians().cos(), max_relative = 1e-9);
    }

    #[test]
    fn test_missing_year_is_data_unavailable() {
        let grid = GridGeometry::new(2, 2, GeoTransform::north_up(0.0, 2.0, 1.0, -1.0), Crs::from_epsg(3857));
        let band = Band::new(2020, CodeGrid::from_elem((2, 2), 3), grid).unwrap();
        let series = InMemoryTimeSeries::from_bands(vec![band]);

        assert_eq!(series.years(), vec![2020]);
        assert_eq!(series.band(2020).unwrap().value_at(1, 1), Some(3));
        assert!(matches!(series.band(2021), Err(LandCoverError::DataUnavailable { year: 2021 })));
    }

    #[test]
    fn test_from_raw_rejects_negative_codes() {
        let grid = GridGeometry::new(1, 2, GeoTransform::north_up(0.0, 1.0, 1.0, -1.0), Crs::from_epsg(3857));
        let values = Array2::from_shape_vec((1, 2), vec![5i32, -1]).unwrap();
        assert!(Band::from_raw(2020, &values, grid).is_err());
    }
}
