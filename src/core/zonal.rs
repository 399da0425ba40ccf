//! Zonal area aggregation
//!
//! A [`RegionMask`] marks the pixels of a grid whose centre falls inside a
//! region. Masks depend only on grid geometry and region, never on the
//! classification scheme, so the [`MaskCache`] keeps them across years and
//! across schemes.

use crate::core::reclassify::RemappedBand;
use crate::io::raster::GridGeometry;
use crate::io::region::RegionOfInterest;
use crate::types::{ClassIndex, Crs, GeoTransform, LandCoverError, LcResult, Year};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "parallel")]
use ndarray::parallel::prelude::*;

const M2_PER_KM2: f64 = 1e6;

/// Area of one class within the region for one year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonalAreaResult {
    pub year: Year,
    pub class_index: ClassIndex,
    pub area_km2: f64,
}

/// Binary inclusion mask of a region against a grid
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    inside: Array2<bool>,
    pixel_count: usize,
    boundary_pixels: usize,
}

impl RegionMask {
    /// Mark every pixel whose centre lies inside `region`.
    ///
    /// North-up grids are filled row by row from the region's scanline
    /// intervals; rotated or mirrored grids test each pixel centre.
    pub fn derive(grid: &GridGeometry, region: &RegionOfInterest) -> LcResult<Self> {
        if grid.crs() != region.crs() {
            return Err(crs_mismatch(grid.crs(), region.crs()));
        }

        let (rows, cols) = grid.shape();
        let gt = *grid.transform();
        let mut inside = Array2::from_elem((rows, cols), false);
        let scanline = !gt.has_rotation() && gt.pixel_width > 0.0;

        log::debug!(
            "Deriving {}x{} region mask ({})",
            rows,
            cols,
            if scanline { "scanline" } else { "point-in-polygon" }
        );

        let fill_row = |row: usize, mut line: ndarray::ArrayViewMut1<bool>| {
            if scanline {
                let (_, y) = gt.pixel_center(row, 0);
                for (xa, xb) in region.scanline_intervals(y) {
                    let start = first_column_at_or_after(xa, gt.top_left_x, gt.pixel_width, cols);
                    let end = first_column_at_or_after(xb, gt.top_left_x, gt.pixel_width, cols);
                    for col in start..end {
                        line[col] = true;
                    }
                }
            } else {
                for col in 0..cols {
                    let (x, y) = gt.pixel_center(row, col);
                    line[col] = region.contains(x, y);
                }
            }
        };

        #[cfg(feature = "parallel")]
        inside
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, line)| fill_row(row, line));

        #[cfg(not(feature = "parallel"))]
        inside
            .axis_iter_mut(Axis(0))
            .enumerate()
            .for_each(|(row, line)| fill_row(row, line));

        let pixel_count = inside.iter().filter(|&&v| v).count();
        let boundary_pixels = count_boundary_cells(&gt, region, rows, cols);
        log::debug!(
            "Region mask covers {} of {} pixels, {} on the boundary",
            pixel_count,
            rows * cols,
            boundary_pixels
        );

        Ok(Self { inside, pixel_count, boundary_pixels })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.inside.dim()
    }

    pub fn is_inside(&self, row: usize, col: usize) -> bool {
        self.inside.get([row, col]).copied().unwrap_or(false)
    }

    /// Number of pixels inside the region
    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Grid cells crossed or touched by a ring of the region, inside or not.
    ///
    /// Only these cells can be misassigned by the centre rule, so this count
    /// times the pixel area bounds the gap between mask area and region area.
    pub fn boundary_pixel_count(&self) -> usize {
        self.boundary_pixels
    }
}

/// Index range of cells touching the closed interval `[lo, hi]` in pixel units
fn touched_cells(lo: f64, hi: f64, n: usize) -> Option<(usize, usize)> {
    let first = lo.ceil() - 1.0;
    let last = hi.floor();
    if last < 0.0 || first >= n as f64 || n == 0 {
        return None;
    }
    Some((first.max(0.0) as usize, last.min(n as f64 - 1.0) as usize))
}

fn count_boundary_cells(gt: &GeoTransform, region: &RegionOfInterest, rows: usize, cols: usize) -> usize {
    let mut touched = Array2::from_elem((rows, cols), false);

    for polygon in region.geometry().iter() {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let (Some((ca, ra)), Some((cb, rb))) =
                    (gt.to_pixel(line.start.x, line.start.y), gt.to_pixel(line.end.x, line.end.y))
                else {
                    continue;
                };
                let Some((row_lo, row_hi)) = touched_cells(ra.min(rb), ra.max(rb), rows) else {
                    continue;
                };

                let dr = rb - ra;
                for row in row_lo..=row_hi {
                    // part of the segment within rows [row, row + 1]
                    let (t0, t1) = if dr.abs() < 1e-12 {
                        (0.0, 1.0)
                    } else {
                        let ta = (row as f64 - ra) / dr;
                        let tb = (row as f64 + 1.0 - ra) / dr;
                        (ta.min(tb).clamp(0.0, 1.0), ta.max(tb).clamp(0.0, 1.0))
                    };
                    let c0 = ca + t0 * (cb - ca);
                    let c1 = ca + t1 * (cb - ca);
                    if let Some((col_lo, col_hi)) = touched_cells(c0.min(c1), c0.max(c1), cols) {
                        for col in col_lo..=col_hi {
                            touched[[row, col]] = true;
                        }
                    }
                }
            }
        }
    }

    touched.iter().filter(|&&v| v).count()
}

/// Smallest column whose centre x is >= `x`, clamped to `[0, cols]`
fn first_column_at_or_after(x: f64, top_left_x: f64, pixel_width: f64, cols: usize) -> usize {
    let col = ((x - top_left_x) / pixel_width - 0.5).ceil();
    col.clamp(0.0, cols as f64) as usize
}

fn crs_mismatch(grid: Crs, region: Crs) -> LandCoverError {
    LandCoverError::Geometry(format!(
        "Region is in {} but the band grid is in {}",
        region, grid
    ))
}

/// Identity of a derived mask: grid geometry plus region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskKey {
    rows: usize,
    cols: usize,
    transform: [u64; 6],
    crs: Crs,
    region: u64,
}

impl MaskKey {
    pub fn new(grid: &GridGeometry, region: &RegionOfInterest) -> Self {
        let (rows, cols) = grid.shape();
        Self {
            rows,
            cols,
            transform: grid.transform().key_bits(),
            crs: grid.crs(),
            region: region.fingerprint(),
        }
    }
}

/// Keyed store of region masks shared by every aggregation that uses it.
///
/// A different region or grid yields a different key, so stale masks are
/// never served; [`MaskCache::invalidate_region`] and [`MaskCache::clear`]
/// only release memory. Scheme changes never invalidate masks.
#[derive(Debug, Default)]
pub struct MaskCache {
    masks: RwLock<HashMap<MaskKey, Arc<RegionMask>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mask for (grid, region), deriving and storing it on a miss
    pub fn get_or_derive(&self, grid: &GridGeometry, region: &RegionOfInterest) -> LcResult<Arc<RegionMask>> {
        let key = MaskKey::new(grid, region);

        let cached = self
            .masks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(mask) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Mask cache hit for {}x{} grid", key.rows, key.cols);
            return Ok(mask);
        }

        // two threads may derive the same mask; the first insert wins
        self.misses.fetch_add(1, Ordering::Relaxed);
        let mask = Arc::new(RegionMask::derive(grid, region)?);
        let mut masks = self.masks.write().unwrap_or_else(PoisonError::into_inner);
        Ok(masks.entry(key).or_insert(mask).clone())
    }

    /// Drop every mask derived for `region`
    pub fn invalidate_region(&self, region: &RegionOfInterest) {
        let fingerprint = region.fingerprint();
        let mut masks = self.masks.write().unwrap_or_else(PoisonError::into_inner);
        masks.retain(|key, _| key.region != fingerprint);
    }

    pub fn clear(&self) {
        self.masks.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.masks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Sums per-class ground area of remapped bands inside a region
#[derive(Debug, Clone, Default)]
pub struct ZonalAggregator {
    cache: Arc<MaskCache>,
}

impl ZonalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator sharing an existing mask cache
    pub fn with_cache(cache: Arc<MaskCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<MaskCache> {
        &self.cache
    }

    /// Area in km² of each requested class inside `region`.
    ///
    /// Every requested class gets an entry, zero when absent from the
    /// clipped pixels.
    pub fn compute_area_by_class(
        &self,
        band: &RemappedBand,
        region: &RegionOfInterest,
        classes: &[ClassIndex],
    ) -> LcResult<BTreeMap<ClassIndex, f64>> {
        let mask = self.cache.get_or_derive(band.grid(), region)?;
        let (rows, cols) = band.shape();
        log::info!(
            "Aggregating {} classes over {} masked pixels for {}",
            classes.len(),
            mask.pixel_count(),
            band.year()
        );

        let mut slots: HashMap<ClassIndex, usize> = HashMap::new();
        for &class in classes {
            let next = slots.len();
            slots.entry(class).or_insert(next);
        }
        let slot_count = slots.len();

        let grid = band.grid();
        let row_areas = grid.row_areas_m2();
        let values = band.classes();

        let add_row = |mut acc: Vec<f64>, row: usize| {
            for col in 0..cols {
                if !mask.is_inside(row, col) {
                    continue;
                }
                if let Some(&slot) = slots.get(&values[[row, col]]) {
                    acc[slot] += match &row_areas {
                        Some(areas) => areas[row],
                        None => grid.pixel_area_m2(row, col),
                    };
                }
            }
            acc
        };

        #[cfg(feature = "parallel")]
        let totals_m2 = {
            use rayon::prelude::*;
            (0..rows)
                .into_par_iter()
                .fold(|| vec![0.0; slot_count], add_row)
                .reduce(|| vec![0.0; slot_count], |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                })
        };

        #[cfg(not(feature = "parallel"))]
        let totals_m2 = (0..rows).fold(vec![0.0; slot_count], add_row);

        Ok(slots
            .into_iter()
            .map(|(class, slot)| (class, totals_m2[slot] / M2_PER_KM2))
            .collect())
    }

    /// Per-year, per-class areas; masks are derived once per distinct grid
    pub fn compute_area_series(
        &self,
        bands: &BTreeMap<Year, RemappedBand>,
        region: &RegionOfInterest,
        classes: &[ClassIndex],
    ) -> LcResult<Vec<ZonalAreaResult>> {
        log::info!("Computing area series for {} years", bands.len());

        let per_year = |(&year, band): (&Year, &RemappedBand)| -> LcResult<Vec<ZonalAreaResult>> {
            let areas = self.compute_area_by_class(band, region, classes)?;
            Ok(areas
                .into_iter()
                .map(|(class_index, area_km2)| ZonalAreaResult { year, class_index, area_km2 })
                .collect())
        };

        #[cfg(feature = "parallel")]
        let per_year_results: Vec<LcResult<Vec<ZonalAreaResult>>> = {
            use rayon::prelude::*;
            bands.par_iter().map(per_year).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let per_year_results: Vec<LcResult<Vec<ZonalAreaResult>>> = bands.iter().map(per_year).collect();

        let mut results = Vec::with_capacity(bands.len() * classes.len());
        for year_results in per_year_results {
            results.extend(year_results?);
        }
        Ok(results)
    }
}

/// Per-class area of one band, with a throwaway mask cache
pub fn compute_area_by_class(
    band: &RemappedBand,
    region: &RegionOfInterest,
    classes: &[ClassIndex],
) -> LcResult<BTreeMap<ClassIndex, f64>> {
    ZonalAggregator::new().compute_area_by_class(band, region, classes)
}

/// Per-year, per-class areas of a set of bands
pub fn compute_area_series(
    bands: &BTreeMap<Year, RemappedBand>,
    region: &RegionOfInterest,
    classes: &[ClassIndex],
) -> LcResult<Vec<ZonalAreaResult>> {
    ZonalAggregator::new().compute_area_series(bands, region, classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reclassify::reclassify;
    use crate::core::scheme::{ClassificationScheme, UnmappedPolicy};
    use crate::io::raster::Band;
    use crate::types::{CodeGrid, GeoTransform};
    use approx::assert_relative_eq;

    fn utm() -> Crs {
        Crs::from_epsg(31983)
    }

    // 10x10 grid of 30 m pixels covering x in [0, 300], y in [0, 300]
    fn grid() -> GridGeometry {
        GridGeometry::new(10, 10, GeoTransform::north_up(0.0, 300.0, 30.0, -30.0), utm())
    }

    fn remapped(year: Year, codes: CodeGrid, grid: GridGeometry) -> RemappedBand {
        let identity = ClassificationScheme::identity(&[1, 2, 3], UnmappedPolicy::Reject).unwrap();
        reclassify(&Band::new(year, codes, grid).unwrap(), &identity).unwrap()
    }

    #[test]
    fn test_full_coverage() {
        let band = remapped(2020, CodeGrid::from_elem((10, 10), 1), grid());
        let region = RegionOfInterest::rectangle(0.0, 0.0, 300.0, 300.0, utm()).unwrap();

        let areas = compute_area_by_class(&band, &region, &[1, 2, 3]).unwrap();

        assert_relative_eq!(areas[&1], 0.09);
        assert_eq!(areas[&2], 0.0);
        assert_eq!(areas[&3], 0.0);
    }

    #[test]
    fn test_partial_coverage_by_class() {
        // left half class 1, right half class 2
        let codes = CodeGrid::from_shape_fn((10, 10), |(_, c)| if c < 5 { 1 } else { 2 });
        let band = remapped(2020, codes, grid());
        // covers columns 3..7 (centres 105..195) and rows 0..4 (centres 285..195)
        let region = RegionOfInterest::rectangle(90.0, 180.0, 210.0, 300.0, utm()).unwrap();

        let areas = compute_area_by_class(&band, &region, &[1, 2]).unwrap();

        assert_relative_eq!(areas[&1], 8.0 * 900.0 / 1e6);
        assert_relative_eq!(areas[&2], 8.0 * 900.0 / 1e6);
    }

    #[test]
    fn test_disjoint_region_gives_zero_areas() {
        let band = remapped(2020, CodeGrid::from_elem((10, 10), 1), grid());
        let region = RegionOfInterest::rectangle(1000.0, 1000.0, 2000.0, 2000.0, utm()).unwrap();

        let areas = compute_area_by_class(&band, &region, &[1, 2]).unwrap();
        assert_eq!(areas.values().sum::<f64>(), 0.0);
        assert_eq!(areas.len(), 2);
    }

    #[test]
    fn test_crs_mismatch_is_geometry_error() {
        let band = remapped(2020, CodeGrid::from_elem((10, 10), 1), grid());
        let region = RegionOfInterest::rectangle(-74.0, -34.0, -35.0, 6.0, Crs::WGS84).unwrap();
        assert!(matches!(
            compute_area_by_class(&band, &region, &[1]),
            Err(LandCoverError::Geometry(_))
        ));
    }

    #[test]
    fn test_mask_boundary_count() {
        let region = RegionOfInterest::rectangle(0.0, 0.0, 300.0, 300.0, utm()).unwrap();
        let mask = RegionMask::derive(&grid(), &region).unwrap();
        assert_eq!(mask.pixel_count(), 100);
        assert_eq!(mask.boundary_pixel_count(), 36);
    }

    #[test]
    fn test_sliver_region_still_has_boundary_cells() {
        // 4 m tall strip between pixel centres: no centre inside, one row touched
        let region = RegionOfInterest::rectangle(0.0, 100.0, 300.0, 104.0, utm()).unwrap();
        let mask = RegionMask::derive(&grid(), &region).unwrap();
        assert_eq!(mask.pixel_count(), 0);
        assert_eq!(mask.boundary_pixel_count(), 10);
    }

    #[test]
    fn test_boundary_cells_clipped_to_grid() {
        let region = RegionOfInterest::rectangle(-600.0, -600.0, 50.0, 50.0, utm()).unwrap();
        let mask = RegionMask::derive(&grid(), &region).unwrap();
        // only the edges at x = 50 and y = 50 reach the grid
        assert_eq!(mask.pixel_count(), 4);
        assert_eq!(mask.boundary_pixel_count(), 3);
        assert!(mask.is_inside(9, 0));
    }

    #[test]
    fn test_mirrored_grid_uses_point_test() {
        // pixel_width < 0: column 0 is the eastmost
        let mirrored = GridGeometry::new(10, 10, GeoTransform::north_up(300.0, 300.0, -30.0, -30.0), utm());
        let region = RegionOfInterest::rectangle(0.0, 0.0, 150.0, 300.0, utm()).unwrap();
        let mask = RegionMask::derive(&mirrored, &region).unwrap();

        assert_eq!(mask.pixel_count(), 50);
        assert!(mask.is_inside(0, 9));
        assert!(!mask.is_inside(0, 0));
    }

    #[test]
    fn test_series_reuses_mask() {
        let bands: BTreeMap<Year, RemappedBand> = (2020..2023)
            .map(|year| (year, remapped(year, CodeGrid::from_elem((10, 10), 3), grid())))
            .collect();
        let region = RegionOfInterest::rectangle(0.0, 0.0, 300.0, 300.0, utm()).unwrap();
        let aggregator = ZonalAggregator::new();

        let results = aggregator.compute_area_series(&bands, &region, &[1, 3]).unwrap();

        assert_eq!(results.len(), 6);
        assert!(results
            .iter()
            .filter(|r| r.class_index == 3)
            .all(|r| (r.area_km2 - 0.09).abs() < 1e-12));
        assert_eq!(aggregator.cache().len(), 1);
        assert_eq!(aggregator.cache().hits() + aggregator.cache().misses(), 3);
        assert!(aggregator.cache().misses() >= 1);

        aggregator.cache().invalidate_region(&region);
        assert!(aggregator.cache().is_empty());
    }
}
