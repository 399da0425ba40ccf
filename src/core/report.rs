//! Area tables and trend reports handed to presentation layers

use crate::core::scheme::ClassificationScheme;
use crate::core::trend::{TimeSeriesAnalyzer, TrendResult};
use crate::core::zonal::ZonalAreaResult;
use crate::types::{ClassIndex, LcResult, Year};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Quantity extracted from an area table for charts and trends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Class area in km²
    AreaKm2,
    /// Class area as a share of that year's total, in percent
    Percentage,
}

/// One (year, class) line of an area table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRow {
    pub year: Year,
    pub class_index: ClassIndex,
    pub class_name: String,
    pub area_km2: f64,
}

/// Per-year, per-class areas, ordered by year then class.
///
/// Percentages divide by a per-year total over every class of the scheme,
/// which does not depend on which classes the table holds rows for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaTable {
    rows: Vec<AreaRow>,
    year_totals_km2: BTreeMap<Year, f64>,
    computed_at: DateTime<Utc>,
}

impl AreaTable {
    /// Table of `results`; year totals are the sum of the scheme's classes
    /// among them, so pass every scheme class or use [`AreaTable::with_year_totals`]
    pub fn from_results(results: &[ZonalAreaResult], scheme: &ClassificationScheme) -> Self {
        let mut rows: Vec<AreaRow> = results
            .iter()
            .map(|r| AreaRow {
                year: r.year,
                class_index: r.class_index,
                class_name: scheme.display_name(r.class_index),
                area_km2: r.area_km2,
            })
            .collect();
        rows.sort_by_key(|row| (row.year, row.class_index));

        let scheme_classes: BTreeSet<ClassIndex> = scheme.class_indices().into_iter().collect();
        let mut year_totals_km2 = BTreeMap::new();
        for row in &rows {
            let total = year_totals_km2.entry(row.year).or_insert(0.0);
            if scheme_classes.contains(&row.class_index) {
                *total += row.area_km2;
            }
        }

        Self {
            rows,
            year_totals_km2,
            computed_at: Utc::now(),
        }
    }

    /// Replace the per-year totals used as the percentage denominator
    pub fn with_year_totals(mut self, totals_km2: BTreeMap<Year, f64>) -> Self {
        self.year_totals_km2.extend(totals_km2);
        self
    }

    pub fn rows(&self) -> &[AreaRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn years(&self) -> Vec<Year> {
        let years: BTreeSet<Year> = self.rows.iter().map(|row| row.year).collect();
        years.into_iter().collect()
    }

    /// Area of every scheme class in `year`, in km²
    pub fn total_area(&self, year: Year) -> f64 {
        self.year_totals_km2.get(&year).copied().unwrap_or(0.0)
    }

    /// `(year, value)` points of one class, ascending by year.
    /// Percentages are 0 for a year whose total area is 0.
    pub fn class_series(&self, class: ClassIndex, metric: Metric) -> Vec<(Year, f64)> {
        self.rows
            .iter()
            .filter(|row| row.class_index == class)
            .map(|row| {
                let value = match metric {
                    Metric::AreaKm2 => row.area_km2,
                    Metric::Percentage => percentage(row.area_km2, self.total_area(row.year)),
                };
                (row.year, value)
            })
            .collect()
    }

    /// Share of each class in `year`, in percent
    pub fn composition(&self, year: Year) -> BTreeMap<ClassIndex, f64> {
        let total = self.total_area(year);
        self.rows
            .iter()
            .filter(|row| row.year == year)
            .map(|row| (row.class_index, percentage(row.area_km2, total)))
            .collect()
    }

    /// Linear trend of one class under `metric`
    pub fn trend(&self, class: ClassIndex, metric: Metric) -> LcResult<TrendReport> {
        let series = self.class_series(class, metric);
        let trend = TimeSeriesAnalyzer::fit_trend(&series)?;
        Ok(TrendReport { class_index: class, metric, trend })
    }
}

fn percentage(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Trend of one class and metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub class_index: ClassIndex,
    pub metric: Metric,
    pub trend: TrendResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheme::UnmappedPolicy;
    use approx::assert_relative_eq;

    fn table() -> AreaTable {
        let scheme = ClassificationScheme::identity(&[1, 2], UnmappedPolicy::Reject).unwrap();
        let results = [
            (2021, 2, 30.0),
            (2020, 1, 75.0),
            (2020, 2, 25.0),
            (2021, 1, 70.0),
            (2022, 1, 65.0),
            (2022, 2, 35.0),
        ]
        .iter()
        .map(|&(year, class_index, area_km2)| ZonalAreaResult { year, class_index, area_km2 })
        .collect::<Vec<_>>();
        AreaTable::from_results(&results, &scheme)
    }

    #[test]
    fn test_rows_are_ordered() {
        let table = table();
        let keys: Vec<(Year, ClassIndex)> = table.rows().iter().map(|r| (r.year, r.class_index)).collect();
        assert_eq!(keys, vec![(2020, 1), (2020, 2), (2021, 1), (2021, 2), (2022, 1), (2022, 2)]);
        assert_eq!(table.rows()[0].class_name, "Classe 1");
        assert_eq!(table.years(), vec![2020, 2021, 2022]);
    }

    #[test]
    fn test_percentage_series_and_composition() {
        let table = table();
        let shares = table.class_series(2, Metric::Percentage);
        assert_eq!(shares.len(), 3);
        assert_relative_eq!(shares[0].1, 25.0);
        assert_relative_eq!(shares[2].1, 35.0);

        let composition = table.composition(2021);
        assert_relative_eq!(composition[&1], 70.0);
        assert_relative_eq!(composition.values().sum::<f64>(), 100.0);
    }

    #[test]
    fn test_class_trend() {
        let report = table().trend(1, Metric::AreaKm2).unwrap();
        assert_relative_eq!(report.trend.slope, -5.0, epsilon = 1e-12);
        assert_relative_eq!(report.trend.intercept, 75.0, epsilon = 1e-12);
        assert_relative_eq!(report.trend.total_change, -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_class_share_uses_year_totals() {
        let scheme = ClassificationScheme::identity(&[1, 2], UnmappedPolicy::Reject).unwrap();
        let water_only = [(2020, 0.045), (2021, 0.03)]
            .iter()
            .map(|&(year, area_km2)| ZonalAreaResult { year, class_index: 2, area_km2 })
            .collect::<Vec<_>>();
        let totals = [(2020, 0.09), (2021, 0.09)].into_iter().collect();

        let table = AreaTable::from_results(&water_only, &scheme).with_year_totals(totals);
        let shares = table.class_series(2, Metric::Percentage);

        assert_relative_eq!(shares[0].1, 50.0, epsilon = 1e-9);
        assert_relative_eq!(shares[1].1, 100.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(table.composition(2020)[&2], 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_total_gives_zero_share() {
        let scheme = ClassificationScheme::identity(&[1], UnmappedPolicy::Reject).unwrap();
        let table = AreaTable::from_results(
            &[ZonalAreaResult { year: 2020, class_index: 1, area_km2: 0.0 }],
            &scheme,
        );
        assert_eq!(table.composition(2020)[&1], 0.0);
    }
}
