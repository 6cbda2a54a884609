use std::{
    fmt::Debug,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use crate::{stats, Table, Test, TrendOptions};

/// A per-subject phenotype value that can be permuted, aggregated over the
/// carriers of a code, and turned into a test statistic.
///
/// Aggregates are sums of labels, so for case/control data (`u32` labels of
/// 0 or 1) the aggregate of a code is its number of cases.
pub trait Label:
    Copy
    + Default
    + PartialEq
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + SubAssign
    + Send
    + Sync
    + 'static
{
    /// The boolean value of this label, if it has one. Bit-packed
    /// permutations can only be built when every label has one.
    fn bit(self) -> Option<bool>;

    /// The aggregate of `count` subjects whose labels are all `true`.
    fn from_count(count: usize) -> Self;

    fn supports(test: Test) -> bool;

    /// Evaluate `test` given the aggregate label of each code and the number
    /// of subjects carrying it.
    fn statistic<const L: usize>(
        test: Test,
        options: &TrendOptions,
        cells: &[Self; L],
        totals: &[u32; L],
    ) -> f64;
}

impl Label for u32 {
    #[inline(always)]
    fn bit(self) -> Option<bool> {
        match self {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    #[inline(always)]
    fn from_count(count: usize) -> Self {
        count as u32
    }

    fn supports(_test: Test) -> bool {
        true
    }

    #[inline(always)]
    fn statistic<const L: usize>(
        test: Test,
        options: &TrendOptions,
        cells: &[Self; L],
        totals: &[u32; L],
    ) -> f64 {
        let table = Table::from_cases(cells, totals);
        match test {
            Test::Trend => stats::trend(&table, &stats::ADDITIVE_WEIGHTS),
            Test::ExtendedTrend => stats::extended_trend(&table, options),
            Test::ChiSquare => stats::chi_square(&table),
            Test::Regression => {
                // 0/1 labels are their own squares
                let sums: [f64; L] = std::array::from_fn(|j| cells[j] as f64);
                stats::regression(totals, &sums, &sums, &options.weights)
            },
        }
    }
}

/// Quantitative label carried as its value and squared value, so that sums
/// over a code give the first two moments needed by the regression test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub value:  f64,
    pub square: f64,
}

impl Moments {
    #[inline]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            square: value * value,
        }
    }

    /// Labels from raw trait values, optionally centered on their mean.
    pub fn from_values(values: &[f64], center: bool) -> Vec<Self> {
        let mean = if center && !values.is_empty() {
            values.iter().sum::<f64>() / values.len() as f64
        } else {
            0.0
        };
        values.iter().map(|v| Self::new(v - mean)).collect()
    }
}

impl Add for Moments {
    type Output = Self;

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        Self {
            value:  self.value + other.value,
            square: self.square + other.square,
        }
    }
}

impl Sub for Moments {
    type Output = Self;

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        Self {
            value:  self.value - other.value,
            square: self.square - other.square,
        }
    }
}

impl AddAssign for Moments {
    #[inline(always)]
    fn add_assign(&mut self, other: Self) {
        self.value += other.value;
        self.square += other.square;
    }
}

impl SubAssign for Moments {
    #[inline(always)]
    fn sub_assign(&mut self, other: Self) {
        self.value -= other.value;
        self.square -= other.square;
    }
}

impl Label for Moments {
    fn bit(self) -> Option<bool> {
        None
    }

    fn from_count(count: usize) -> Self {
        Self {
            value:  count as f64,
            square: count as f64,
        }
    }

    fn supports(test: Test) -> bool {
        matches!(test, Test::Regression)
    }

    #[inline(always)]
    fn statistic<const L: usize>(
        test: Test,
        options: &TrendOptions,
        cells: &[Self; L],
        totals: &[u32; L],
    ) -> f64 {
        match test {
            Test::Regression => {
                let sums: [f64; L] = std::array::from_fn(|j| cells[j].value);
                let squares: [f64; L] = std::array::from_fn(|j| cells[j].square);
                stats::regression(totals, &sums, &squares, &options.weights)
            },
            _ => 0.0,
        }
    }
}

/// Case/control labels as 0/1 indicators.
pub fn dichotomous(affected: &[bool]) -> Vec<u32> {
    affected.iter().map(|a| *a as u32).collect()
}
