//! Linear trends and descriptive statistics over yearly series

use crate::types::{LandCoverError, LcResult, Year};
use serde::{Deserialize, Serialize};

/// Keeps the t statistic finite for perfect fits
const TINY: f64 = 1.0e-20;

/// Ordinary least-squares fit of value against year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    /// Change per year
    pub slope: f64,
    /// Fitted value at `base_year`
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-sided p-value of the slope (Student's t, n - 2 degrees of freedom)
    pub p_value: f64,
    /// Standard error of the slope
    pub std_err: f64,
    /// Fitted value at the last year minus fitted value at the first year
    pub total_change: f64,
    /// First year of the series; x is measured in years since it
    pub base_year: Year,
    pub n: usize,
}

impl TrendResult {
    /// Value of the fitted line at `year`
    pub fn predict(&self, year: Year) -> f64 {
        self.intercept + self.slope * (year - self.base_year) as f64
    }
}

/// Summary statistics of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Descriptive {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// (max - min) / min * 100, absent when min is zero
    pub percent_change: Option<f64>,
}

/// Trend fitting and descriptive statistics
pub struct TimeSeriesAnalyzer;

impl TimeSeriesAnalyzer {
    /// Fit a linear trend to `(year, value)` points.
    ///
    /// Fails with `Computation` for fewer than two points, non-finite values,
    /// or when every point has the same year.
    pub fn fit_trend(points: &[(Year, f64)]) -> LcResult<TrendResult> {
        let n = points.len();
        if n < 2 {
            return Err(LandCoverError::Computation(format!(
                "Trend needs at least 2 points, got {}",
                n
            )));
        }
        if let Some((year, value)) = points.iter().find(|(_, v)| !v.is_finite()) {
            return Err(LandCoverError::Computation(format!(
                "Non-finite value {} for year {}",
                value, year
            )));
        }

        let mut sorted = points.to_vec();
        sorted.sort_by_key(|&(year, _)| year);
        let base_year = sorted[0].0;
        let last_year = sorted[n - 1].0;

        let xs: Vec<f64> = sorted.iter().map(|&(year, _)| (year - base_year) as f64).collect();
        let ys: Vec<f64> = sorted.iter().map(|&(_, value)| value).collect();

        let nf = n as f64;
        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
        let sum_x2: f64 = xs.iter().map(|x| x * x).sum();

        let denominator = nf * sum_x2 - sum_x * sum_x;
        if denominator <= 0.0 {
            return Err(LandCoverError::Computation(
                "All points share the same year; trend is undefined".to_string(),
            ));
        }

        let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / nf;

        let mean_x = sum_x / nf;
        let mean_y = sum_y / nf;
        let ss_xx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        let ss_yy: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
        let ss_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

        let r = if ss_yy == 0.0 {
            0.0
        } else {
            (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0)
        };

        let (p_value, std_err) = if n == 2 {
            let p = if ys[0] == ys[1] { 1.0 } else { 0.0 };
            (p, 0.0)
        } else {
            let df = (n - 2) as f64;
            let t = r * (df / ((1.0 - r + TINY) * (1.0 + r + TINY))).sqrt();
            let p = student_t_two_sided(t, df);
            let se = ((1.0 - r * r).max(0.0) * ss_yy / ss_xx / df).sqrt();
            (p, se)
        };

        let total_change = slope * (last_year - base_year) as f64;

        log::debug!(
            "Trend over {} points from {}: slope={:.4}, r2={:.4}, p={:.4}",
            n,
            base_year,
            slope,
            r * r,
            p_value
        );

        Ok(TrendResult {
            slope,
            intercept,
            r_squared: r * r,
            p_value,
            std_err,
            total_change,
            base_year,
            n,
        })
    }

    /// Mean, sample standard deviation, range and relative range of `values`
    pub fn describe(values: &[f64]) -> LcResult<Descriptive> {
        if values.is_empty() {
            return Err(LandCoverError::Computation(
                "Cannot describe an empty series".to_string(),
            ));
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let percent_change = if min == 0.0 {
            None
        } else {
            Some((max - min) / min * 100.0)
        };

        Ok(Descriptive {
            mean,
            std_dev,
            min,
            max,
            percent_change,
        })
    }

    /// Year with the largest value (earliest year on ties)
    pub fn peak(points: &[(Year, f64)]) -> Option<(Year, f64)> {
        points.iter().copied().fold(None, |best, (year, value)| match best {
            Some((best_year, best_value)) if best_value > value || (best_value == value && best_year < year) => best,
            _ => Some((year, value)),
        })
    }

    /// Value at `year` minus the series mean
    pub fn deviation_from_mean(points: &[(Year, f64)], year: Year) -> LcResult<f64> {
        let value = points
            .iter()
            .find(|&&(y, _)| y == year)
            .map(|&(_, v)| v)
            .ok_or(LandCoverError::DataUnavailable { year })?;
        let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
        let stats = Self::describe(&values)?;
        Ok(value - stats.mean)
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Natural log of the gamma function (Lanczos, g = 7)
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + 7.5;
    let series = COEFFS
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEFFS[0], |acc, (i, &c)| acc + c / (x + i as f64));

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta function I_x(a, b)
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta (modified Lentz)
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1.0e-15;
    const FPMIN: f64 = 1.0e-300;

    let guard = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    h
}
