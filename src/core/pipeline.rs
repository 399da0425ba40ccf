use crate::config::EngineConfig;
use crate::core::partial::PartialResult;
use crate::core::reclassify::Reclassifier;
use crate::core::report::AreaTable;
use crate::core::scheme::ClassificationScheme;
use crate::core::zonal::{MaskCache, ZonalAggregator, ZonalAreaResult};
use crate::io::fetch::BandFetcher;
use crate::io::raster::{Band, RasterTimeSeries};
use crate::io::region::RegionOfInterest;
use crate::types::{ClassIndex, LandCoverError, LcResult, Year};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Fetch, reclassify and aggregate a series of years into an area table
pub struct AreaSeriesPipeline {
    config: EngineConfig,
    fetcher: BandFetcher,
    aggregator: ZonalAggregator,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl AreaSeriesPipeline {
    pub fn new(config: EngineConfig) -> LcResult<Self> {
        config.validate()?;
        let fetcher = BandFetcher::new(&config)?;

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_worker_threads())
            .thread_name(|i| format!("landcover-worker-{}", i))
            .build()
            .map_err(|e| LandCoverError::Config(format!("Failed to build worker pool: {}", e)))?;

        log::info!(
            "Area pipeline ready: {} worker threads, {} fetches in flight",
            config.effective_worker_threads(),
            config.max_in_flight_fetches
        );

        Ok(Self {
            config,
            fetcher,
            aggregator: ZonalAggregator::new(),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Pipeline reusing masks from an existing cache
    pub fn with_mask_cache(config: EngineConfig, cache: Arc<MaskCache>) -> LcResult<Self> {
        let mut pipeline = Self::new(config)?;
        pipeline.aggregator = ZonalAggregator::with_cache(cache);
        Ok(pipeline)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mask_cache(&self) -> &Arc<MaskCache> {
        self.aggregator.cache()
    }

    /// Per-class areas of `region` for each requested year.
    ///
    /// An empty `classes` slice means every class of the scheme. Years whose
    /// band cannot be fetched or reclassified are reported in
    /// `failed_years`. An empty year list fails before any fetch. Bands are
    /// fetched one at a time until the first one arrives; if it is in a
    /// different CRS than the region the call fails before the remaining
    /// years are fetched.
    ///
    /// Every scheme class is aggregated so that percentages in the returned
    /// table divide by the whole in-scheme area, whichever classes were asked for.
    pub fn run(
        &self,
        series: Arc<dyn RasterTimeSeries>,
        scheme: &ClassificationScheme,
        region: &RegionOfInterest,
        classes: &[ClassIndex],
        years: &[Year],
    ) -> LcResult<PartialResult<AreaTable>> {
        let years: Vec<Year> = years.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if years.is_empty() {
            return Err(LandCoverError::Config("No years requested".to_string()));
        }
        let scheme_classes: BTreeSet<ClassIndex> = scheme.class_indices().into_iter().collect();
        let requested: BTreeSet<ClassIndex> = if classes.is_empty() {
            scheme_classes.clone()
        } else {
            classes.iter().copied().collect()
        };
        let aggregated: Vec<ClassIndex> = requested.union(&scheme_classes).copied().collect();

        log::info!(
            "Area series for {} years, {} classes, region in {}",
            years.len(),
            requested.len(),
            region.crs()
        );

        let mut fetched = Vec::with_capacity(years.len());
        let mut remaining = years.as_slice();
        while let Some((&year, rest)) = remaining.split_first() {
            remaining = rest;
            let outcome = self.fetcher.fetch_years(Arc::clone(&series), &[year]);
            let arrived = outcome.iter().any(|(_, band)| band.is_ok());
            fetched.extend(outcome);
            if arrived {
                break;
            }
        }
        ensure_region_crs(&fetched, region)?;
        fetched.extend(self.fetcher.fetch_years(series, remaining));
        ensure_region_crs(&fetched, region)?;

        let reclassifier = Reclassifier::new(scheme);
        let process = |(year, band): (Year, LcResult<Band>)| -> (Year, LcResult<YearAreas>) {
            let areas = band
                .and_then(|band| reclassifier.reclassify(&band))
                .and_then(|remapped| self.aggregator.compute_area_by_class(&remapped, region, &aggregated))
                .map(|areas| {
                    let total_km2 = scheme_classes.iter().filter_map(|class| areas.get(class)).sum();
                    let results = areas
                        .into_iter()
                        .filter(|(class_index, _)| requested.contains(class_index))
                        .map(|(class_index, area_km2)| ZonalAreaResult { year, class_index, area_km2 })
                        .collect();
                    YearAreas { results, total_km2 }
                });
            (year, areas)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<(Year, LcResult<YearAreas>)> = self.pool.install(|| {
            use rayon::prelude::*;
            fetched.into_par_iter().map(process).collect()
        });

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(Year, LcResult<YearAreas>)> = fetched.into_iter().map(process).collect();

        let partial: PartialResult<BTreeMap<Year, YearAreas>> = PartialResult::collect(outcomes);
        log::info!(
            "Area series done: {} years succeeded, {} failed",
            partial.succeeded_years.len(),
            partial.failed_years.len()
        );

        Ok(partial.map(|by_year| {
            let totals: BTreeMap<Year, f64> = by_year.iter().map(|(&year, areas)| (year, areas.total_km2)).collect();
            let results: Vec<ZonalAreaResult> = by_year.into_values().flat_map(|areas| areas.results).collect();
            AreaTable::from_results(&results, scheme).with_year_totals(totals)
        }))
    }
}

/// Requested rows of one year plus the area of every scheme class
struct YearAreas {
    results: Vec<ZonalAreaResult>,
    total_km2: f64,
}

fn ensure_region_crs(fetched: &[(Year, LcResult<Band>)], region: &RegionOfInterest) -> LcResult<()> {
    for (year, band) in fetched {
        if let Ok(band) = band {
            if band.grid().crs() != region.crs() {
                return Err(LandCoverError::Geometry(format!(
                    "Band {} is in {} but the region is in {}",
                    year,
                    band.grid().crs(),
                    region.crs()
                )));
            }
        }
    }
    Ok(())
}
