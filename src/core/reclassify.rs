use crate::core::partial::PartialResult;
use crate::core::scheme::{ClassificationScheme, UnmappedPolicy};
use crate::io::raster::{Band, GridGeometry, RasterTimeSeries};
use crate::types::{ClassGrid, ClassIndex, LandCoverError, LcResult, Year};
use std::collections::BTreeMap;

/// A band whose values are semantic class indices
#[derive(Debug, Clone, PartialEq)]
pub struct RemappedBand {
    year: Year,
    classes: ClassGrid,
    grid: GridGeometry,
}

impl RemappedBand {
    pub fn year(&self) -> Year {
        self.year
    }

    pub fn shape(&self) -> (usize, usize) {
        self.classes.dim()
    }

    pub fn class_at(&self, row: usize, col: usize) -> Option<ClassIndex> {
        self.classes.get([row, col]).copied()
    }

    pub fn classes(&self) -> &ClassGrid {
        &self.classes
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    /// Treat the class indices as raw codes again (for chained remapping)
    pub fn into_band(self) -> LcResult<Band> {
        Band::new(self.year, self.classes, self.grid)
    }
}

/// Applies a classification scheme to classification bands
pub struct Reclassifier<'a> {
    scheme: &'a ClassificationScheme,
}

impl<'a> Reclassifier<'a> {
    pub fn new(scheme: &'a ClassificationScheme) -> Self {
        Self { scheme }
    }

    /// Remap every pixel of `band` through the scheme
    pub fn reclassify(&self, band: &Band) -> LcResult<RemappedBand> {
        let (rows, cols) = band.shape();
        log::info!("Reclassifying {}x{} band for {}", rows, cols, band.year());

        let scheme = self.scheme;
        if scheme.policy() == UnmappedPolicy::Reject {
            if let Some(&code) = band.codes().iter().find(|&&code| !scheme.contains_code(code)) {
                log::warn!("Band {} contains raw code {} outside the scheme", band.year(), code);
                return Err(LandCoverError::UnmappedCode { code });
            }
        }

        // every code resolves here: unlisted codes were rejected above
        let remap = |&code: &u16| scheme.resolve(code).unwrap_or(code);

        #[cfg(feature = "parallel")]
        let classes = ndarray::Zip::from(band.codes()).par_map_collect(remap);

        #[cfg(not(feature = "parallel"))]
        let classes = band.codes().map(remap);

        Ok(RemappedBand {
            year: band.year(),
            classes,
            grid: band.grid().clone(),
        })
    }

    /// Remap the requested years of a series; a failing year does not stop the others
    pub fn reclassify_many(
        &self,
        series: &dyn RasterTimeSeries,
        years: &[Year],
    ) -> PartialResult<BTreeMap<Year, RemappedBand>> {
        log::info!("Reclassifying {} years", years.len());

        let process = |year: Year| -> (Year, LcResult<RemappedBand>) {
            let result = series.band(year).and_then(|band| self.reclassify(&band));
            (year, result)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<(Year, LcResult<RemappedBand>)> = {
            use rayon::prelude::*;
            years.par_iter().map(|&year| process(year)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(Year, LcResult<RemappedBand>)> =
            years.iter().map(|&year| process(year)).collect();

        PartialResult::collect(outcomes)
    }
}

/// Remap one band through `scheme`
pub fn reclassify(band: &Band, scheme: &ClassificationScheme) -> LcResult<RemappedBand> {
    Reclassifier::new(scheme).reclassify(band)
}

/// Remap the requested years of `series` through `scheme`
pub fn reclassify_many(
    series: &dyn RasterTimeSeries,
    scheme: &ClassificationScheme,
    years: &[Year],
) -> PartialResult<BTreeMap<Year, RemappedBand>> {
    Reclassifier::new(scheme).reclassify_many(series, years)
}
