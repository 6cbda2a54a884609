//! Test statistics over 2xL tables and per-code label moments. Every
//! statistic returns 0.0 instead of NaN when its denominator is not positive.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::Table;

pub const ADDITIVE_WEIGHTS: [f64; 3] = [0.0, 1.0, 2.0];

// relative tolerance below which a centered sum of squares counts as zero
const DEGENERATE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Test {
    /// Cochran-Armitage trend test, additive weights, pooled variance.
    Trend,
    /// Trend test with the configured weights and variance estimator.
    ExtendedTrend,
    /// Pearson chi-square over all columns of the table.
    ChiSquare,
    /// Score statistic `n * r^2` of the labels regressed on code weights.
    Regression,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceEstimator {
    /// Variance of the weights estimated from cases and controls together.
    #[default]
    Pooled,
    /// Variances estimated separately within cases and within controls.
    Unpooled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendOptions {
    pub weights:  [f64; 3],
    pub variance: VarianceEstimator,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            weights:  ADDITIVE_WEIGHTS,
            variance: VarianceEstimator::Pooled,
        }
    }
}

#[inline(always)]
fn weighted<const L: usize>(counts: &[u32; L], weights: &[f64]) -> (f64, f64) {
    let mut w = 0.0;
    let mut w2 = 0.0;
    for j in 0..L {
        let c = counts[j] as f64;
        w += weights[j] * c;
        w2 += weights[j] * weights[j] * c;
    }
    (w, w2)
}

/// Trend test with pooled variance,
/// `N (N sum(w r) - R sum(w n))^2 / (R S (N sum(w^2 n) - sum(w n)^2))`.
#[inline]
pub fn trend<const L: usize>(table: &Table<L>, weights: &[f64]) -> f64 {
    let r = table.case_total() as f64;
    let s = table.control_total() as f64;
    let n = r + s;
    let columns: [u32; L] = std::array::from_fn(|j| table.column(j));
    let (wr, _) = weighted(table.cases(), weights);
    let (wn, w2n) = weighted(&columns, weights);
    let spread = n * w2n - wn * wn;
    if r <= 0.0 || s <= 0.0 || spread <= DEGENERATE * (n * w2n).abs().max(1.0) {
        return 0.0;
    }
    let u = n * wr - r * wn;
    n * u * u / (r * s * spread)
}

/// Trend test with the variance of the weight difference estimated
/// separately in cases and controls.
#[inline]
pub fn trend_unpooled<const L: usize>(table: &Table<L>, weights: &[f64]) -> f64 {
    let r = table.case_total() as f64;
    let s = table.control_total() as f64;
    if r <= 0.0 || s <= 0.0 {
        return 0.0;
    }
    let (wr, w2r) = weighted(table.cases(), weights);
    let (ws, w2s) = weighted(table.controls(), weights);
    let mean_r = wr / r;
    let mean_s = ws / s;
    let var_r = centered(w2r / r, mean_r);
    let var_s = centered(w2s / s, mean_s);
    let variance = var_r / r + var_s / s;
    if variance <= 0.0 {
        return 0.0;
    }
    let d = mean_r - mean_s;
    d * d / variance
}

// variance from a second moment and a mean, snapped to zero when it is
// rounding error
#[inline]
fn centered(second: f64, mean: f64) -> f64 {
    let variance = (second - mean * mean).max(0.0);
    if variance <= DEGENERATE * second.max(1.0) {
        0.0
    } else {
        variance
    }
}

#[inline]
pub fn extended_trend<const L: usize>(table: &Table<L>, options: &TrendOptions) -> f64 {
    match options.variance {
        VarianceEstimator::Pooled => trend(table, &options.weights),
        VarianceEstimator::Unpooled => trend_unpooled(table, &options.weights),
    }
}

/// Pearson chi-square without continuity correction. Empty columns add
/// nothing.
#[inline]
pub fn chi_square<const L: usize>(table: &Table<L>) -> f64 {
    let r = table.case_total() as f64;
    let s = table.control_total() as f64;
    let n = r + s;
    if r <= 0.0 || s <= 0.0 {
        return 0.0;
    }
    let mut chi2 = 0.0;
    for j in 0..L {
        let column = table.column(j) as f64;
        if column <= 0.0 {
            continue;
        }
        let expected_r = column * r / n;
        let expected_s = column * s / n;
        let dr = table.cases()[j] as f64 - expected_r;
        let ds = table.controls()[j] as f64 - expected_s;
        chi2 += dr * dr / expected_r + ds * ds / expected_s;
    }
    chi2
}

/// Score statistic `n * r^2` for the labels regressed on the code weights,
/// computed from the number of subjects per code and the sum and sum of
/// squares of their labels.
#[inline]
pub fn regression<const L: usize>(
    totals: &[u32; L],
    sums: &[f64; L],
    squares: &[f64; L],
    weights: &[f64],
) -> f64 {
    let mut n = 0.0;
    let mut sx = 0.0;
    let mut sxx = 0.0;
    let mut sy = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for j in 0..L {
        let c = totals[j] as f64;
        let w = weights[j];
        n += c;
        sx += w * c;
        sxx += w * w * c;
        sy += sums[j];
        syy += squares[j];
        sxy += w * sums[j];
    }
    if n < 2.0 {
        return 0.0;
    }
    let cxx = sxx - sx * sx / n;
    let cyy = syy - sy * sy / n;
    if cxx <= DEGENERATE * sxx.abs().max(1.0) || cyy <= DEGENERATE * syy.abs().max(1.0) {
        return 0.0;
    }
    let cxy = sxy - sx * sy / n;
    n * cxy * cxy / (cxx * cyy)
}

pub fn degrees_of_freedom(test: Test, codes: usize) -> f64 {
    match test {
        Test::ChiSquare => codes.saturating_sub(1).max(1) as f64,
        Test::Trend | Test::ExtendedTrend | Test::Regression => 1.0,
    }
}

/// Asymptotic upper-tail chi-square p-value of a statistic, unadjusted for
/// multiple testing.
pub fn nominal_p_value(test: Test, statistic: f64, codes: usize) -> f64 {
    if statistic.is_nan() || statistic <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(degrees_of_freedom(test, codes)) {
        Ok(dist) => dist.sf(statistic),
        Err(_) => 1.0,
    }
}
