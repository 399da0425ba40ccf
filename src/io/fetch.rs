//! Bounded band fetching from a raster collaborator
//!
//! Bands usually come from a network-backed service with quotas. The
//! [`BandFetcher`] caps the number of fetches in flight with a semaphore,
//! optionally spaces out fetch starts, and runs each synchronous
//! [`RasterTimeSeries::band`] call on tokio's blocking pool. Every year gets
//! its own outcome; one failing or panicking fetch never affects the others.

use crate::config::EngineConfig;
use crate::io::raster::{Band, RasterTimeSeries};
use crate::types::{LandCoverError, LcResult, Year};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Fetches yearly bands with bounded concurrency
pub struct BandFetcher {
    runtime: Runtime,
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
    min_interval: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl BandFetcher {
    pub fn new(config: &EngineConfig) -> LcResult<Self> {
        config.validate()?;
        let max_in_flight = config.max_in_flight_fetches;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_in_flight)
            .thread_name("band-fetch")
            .enable_time()
            .build()
            .map_err(|e| LandCoverError::Config(format!("Failed to start fetch runtime: {}", e)))?;

        log::debug!(
            "Band fetcher: {} in flight, {} ms between starts",
            max_in_flight,
            config.min_fetch_interval_ms
        );

        Ok(Self {
            runtime,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            min_interval: Duration::from_millis(config.min_fetch_interval_ms),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Highest number of simultaneous fetches observed so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Fetch `years` from `series`, one outcome per year in request order.
    ///
    /// Must not be called from inside another tokio runtime.
    pub fn fetch_years(
        &self,
        series: Arc<dyn RasterTimeSeries>,
        years: &[Year],
    ) -> Vec<(Year, LcResult<Band>)> {
        log::info!("Fetching {} bands (at most {} in flight)", years.len(), self.max_in_flight);

        self.runtime.block_on(async {
            let mut ticker = (!self.min_interval.is_zero()).then(|| {
                let mut ticker = tokio::time::interval(self.min_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            let mut pending: Vec<(Year, LcResult<JoinHandle<LcResult<Band>>>)> = Vec::with_capacity(years.len());
            for &year in years {
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }

                let permit = match self.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        pending.push((year, Err(fetch_failed(year, e))));
                        continue;
                    }
                };

                let series = Arc::clone(&series);
                let in_flight = Arc::clone(&self.in_flight);
                let peak = Arc::clone(&self.peak_in_flight);
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let _slot = InFlightSlot::enter(in_flight, &peak);
                    log::debug!("Fetching band for {}", year);
                    series.band(year)
                });
                pending.push((year, Ok(handle)));
            }

            let mut outcomes = Vec::with_capacity(pending.len());
            for (year, handle) in pending {
                let outcome = match handle {
                    Ok(handle) => match handle.await {
                        Ok(band) => band,
                        Err(e) => Err(fetch_failed(year, e)),
                    },
                    Err(e) => Err(e),
                };
                outcomes.push((year, outcome));
            }
            outcomes
        })
    }
}

/// Counts one running fetch until dropped, including on panic
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn enter(counter: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
        peak.fetch_max(current, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn fetch_failed(year: Year, err: impl std::fmt::Display) -> LandCoverError {
    LandCoverError::ExternalService {
        year,
        reason: format!("fetch task failed: {}", err),
    }
}
