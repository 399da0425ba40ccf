//! Per-year partial results for batch operations

use crate::types::{ErrorKind, LandCoverError, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why one year of a batch was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearFailure {
    pub kind: ErrorKind,
    pub reason: String,
}

impl From<&LandCoverError> for YearFailure {
    fn from(err: &LandCoverError) -> Self {
        Self {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Outcome of a batch over years: the value built from the years that
/// succeeded plus the reason for every year that did not
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult<T> {
    pub value: T,
    pub succeeded_years: Vec<Year>,
    pub failed_years: BTreeMap<Year, YearFailure>,
}

impl<V> PartialResult<BTreeMap<Year, V>> {
    /// Split per-year outcomes into successes and failures
    pub fn collect<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (Year, Result<V, LandCoverError>)>,
    {
        let mut value = BTreeMap::new();
        let mut failed_years = BTreeMap::new();

        for (year, outcome) in outcomes {
            match outcome {
                Ok(v) => {
                    value.insert(year, v);
                }
                Err(err) => {
                    log::warn!("Skipping year {}: {}", year, err);
                    failed_years.insert(year, YearFailure::from(&err));
                }
            }
        }

        let succeeded_years = value.keys().copied().collect();
        Self {
            value,
            succeeded_years,
            failed_years,
        }
    }
}

impl<T> PartialResult<T> {
    pub fn is_complete(&self) -> bool {
        self.failed_years.is_empty()
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> PartialResult<U> {
        PartialResult {
            value: f(self.value),
            succeeded_years: self.succeeded_years,
            failed_years: self.failed_years,
        }
    }

    /// Record additional failed years, e.g. from a later stage
    pub fn with_failures(mut self, failures: BTreeMap<Year, YearFailure>) -> Self {
        self.succeeded_years.retain(|year| !failures.contains_key(year));
        self.failed_years.extend(failures);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_splits_outcomes() {
        let outcomes = vec![
            (2022, Ok(3)),
            (2020, Ok(1)),
            (2021, Err(LandCoverError::DataUnavailable { year: 2021 })),
        ];
        let result = PartialResult::collect(outcomes);

        assert_eq!(result.succeeded_years, vec![2020, 2022]);
        assert_eq!(result.failed_years[&2021].kind, ErrorKind::DataUnavailableError);
        assert_eq!(result.failed_years[&2021].reason, "Data unavailable for year 2021");
        assert!(!result.is_complete());
    }
}
