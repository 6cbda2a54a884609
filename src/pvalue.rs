//! Max-T adjusted p-values from the empirical null distribution of the
//! per-permutation maximum statistic.

use std::cmp::Ordering;

use crate::Error;

// a NaN compares as unordered and so counts as out of order
fn check_decreasing(observed: &[f64]) -> Result<(), Error> {
    let ordered = |w: &[f64]| {
        matches!(
            w[0].partial_cmp(&w[1]),
            Some(Ordering::Greater | Ordering::Equal)
        )
    };
    match observed.windows(2).position(|w| !ordered(w)) {
        Some(i) => Err(Error::UnsortedStatistics(i + 1)),
        None => Ok(()),
    }
}

fn check_increasing(null: &[f64]) -> Result<(), Error> {
    let ordered = |w: &[f64]| {
        matches!(
            w[0].partial_cmp(&w[1]),
            Some(Ordering::Less | Ordering::Equal)
        )
    };
    match null.windows(2).position(|w| !ordered(w)) {
        Some(i) => Err(Error::UnsortedNull(i + 1)),
        None => Ok(()),
    }
}

/// For each observed statistic, the number of null maxima at least as large.
/// `observed` must be sorted decreasing and `null` increasing.
pub fn single_step_counts(observed: &[f64], null: &[f64]) -> Result<Vec<usize>, Error> {
    check_decreasing(observed)?;
    check_increasing(null)?;
    Ok(observed
        .iter()
        .map(|&t| null.len() - null.partition_point(|&x| x < t))
        .collect())
}

/// Single-step adjusted p-values `(count + 1) / (permutations + 1)`.
pub fn single_step(observed: &[f64], null: &[f64]) -> Result<Vec<f64>, Error> {
    let denominator = (null.len() + 1) as f64;
    Ok(single_step_counts(observed, null)?
        .into_iter()
        .map(|c| (c + 1) as f64 / denominator)
        .collect())
}

/// Step-down max-T by successive maximization.
///
/// In each block the markers are folded from the least significant rank to
/// the most significant one. The running per-permutation maximum after
/// folding rank `r` is the null maximum over all markers ranked `r` or
/// lower, which is compared against the observed statistic of rank `r`.
#[derive(Debug, Clone)]
pub struct StepDown {
    observed:     Vec<f64>,
    counts:       Vec<u64>,
    maxima:       Vec<f64>,
    remaining:    usize,
    permutations: u64,
}

impl StepDown {
    pub fn new(observed: Vec<f64>) -> Result<Self, Error> {
        check_decreasing(&observed)?;
        Ok(Self {
            counts: vec![0; observed.len()],
            observed,
            maxima: Vec::new(),
            remaining: 0,
            permutations: 0,
        })
    }

    pub fn begin_block(&mut self, permutations: usize) {
        self.maxima.clear();
        self.maxima.resize(permutations, 0.0);
        self.remaining = self.observed.len();
    }

    /// Fold the permuted statistics of the marker at `rank`. Ranks must
    /// arrive in decreasing order, starting from the last one.
    pub fn fold(&mut self, rank: usize, permuted: &[f64]) -> Result<(), Error> {
        if self.remaining == 0 || rank != self.remaining - 1 {
            return Err(Error::StepDownOrder {
                remaining: self.remaining,
                found:     rank,
            });
        }
        if permuted.len() != self.maxima.len() {
            return Err(Error::PermutationLengthMismatch {
                expected: self.maxima.len(),
                found:    permuted.len(),
            });
        }
        let t = self.observed[rank];
        let mut count = 0;
        for (m, &x) in self.maxima.iter_mut().zip(permuted.iter()) {
            if x > *m {
                *m = x;
            }
            if *m >= t {
                count += 1;
            }
        }
        self.counts[rank] += count;
        self.remaining -= 1;
        Ok(())
    }

    /// Close the block and return its per-permutation maxima over all
    /// markers, which are the block's contribution to the null distribution.
    pub fn finish_block(&mut self) -> Result<&[f64], Error> {
        if self.remaining != 0 {
            return Err(Error::StepDownIncomplete(self.remaining));
        }
        self.permutations += self.maxima.len() as u64;
        Ok(&self.maxima)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn permutations(&self) -> u64 {
        self.permutations
    }

    /// Adjusted p-values by rank, forced non-decreasing from the most
    /// significant rank down.
    pub fn p_values(&self) -> Vec<f64> {
        let denominator = (self.permutations + 1) as f64;
        let mut running = 0.0f64;
        self.counts
            .iter()
            .map(|&c| {
                running = running.max((c + 1) as f64 / denominator);
                running
            })
            .collect()
    }
}

/// The per-permutation maxima of every block, possibly gathered from
/// several independent processes.
#[derive(Debug, Clone, Default)]
pub struct NullDistribution {
    maxima: Vec<f64>,
    sorted: bool,
}

impl NullDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    pub fn extend(&mut self, block: &[f64]) {
        self.maxima.extend_from_slice(block);
        self.sorted = false;
    }

    /// Combine with the distribution of another process. The result does not
    /// depend on the order in which distributions are merged.
    pub fn merge(&mut self, other: NullDistribution) {
        self.maxima.extend(other.maxima);
        self.sorted = false;
    }

    /// The maxima in increasing order.
    pub fn sorted(&mut self) -> &[f64] {
        if !self.sorted {
            self.maxima.sort_by(f64::total_cmp);
            self.sorted = true;
        }
        &self.maxima
    }
}
