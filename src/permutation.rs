use tracing::{debug, trace};

use crate::{BitSet, Error, Label, PermutationSource};

/// A block of pre-drawn label permutations.
///
/// The numeric form is stored transposed: row `i` holds the label of
/// subject `i` under every permutation, so summing the rows of a code's
/// carriers yields one aggregate per permutation. The optional bit form
/// holds one packed bitset per permutation. Column `k` of the numeric form
/// and bitset `k` always describe the same permutation.
#[derive(Debug, Clone)]
pub struct PermutationMatrix<T: Label> {
    labels:       Vec<T>,
    permutations: usize,
    values:       Vec<T>,
    bits:         Option<Vec<BitSet>>,
    total:        T,
    source:       PermutationSource,
    scratch:      Vec<T>,
}

impl<T: Label> PermutationMatrix<T> {
    #[tracing::instrument(skip(source, labels))]
    pub fn new(
        permutations: usize,
        source: PermutationSource,
        labels: Vec<T>,
        bit_form: bool,
    ) -> Result<Self, Error> {
        if bit_form && labels.iter().any(|l| l.bit().is_none()) {
            return Err(Error::BitFormUnsupported);
        }
        let mut total = T::default();
        for &l in &labels {
            total += l;
        }
        let mut matrix = Self {
            scratch: labels.clone(),
            values: Vec::new(),
            bits: bit_form.then(Vec::new),
            labels,
            permutations,
            total,
            source,
        };
        matrix.reshuffle_with(permutations);
        Ok(matrix)
    }

    /// Number of permutations in this block.
    #[inline]
    pub fn permutations(&self) -> usize {
        self.permutations
    }

    /// Number of subjects.
    #[inline]
    pub fn samples(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn has_bits(&self) -> bool {
        self.bits.is_some()
    }

    #[inline]
    pub fn labels(&self) -> &[T] {
        &self.labels
    }

    /// Sum of all labels, identical under every permutation.
    #[inline]
    pub fn total(&self) -> T {
        self.total
    }

    /// Labels of subject `i` under every permutation.
    #[inline(always)]
    pub fn row(&self, i: usize) -> &[T] {
        let p = self.permutations;
        &self.values[i * p..(i + 1) * p]
    }

    #[inline]
    pub fn bits(&self) -> Option<&[BitSet]> {
        self.bits.as_deref()
    }

    /// Labels under permutation `k`.
    pub fn column(&self, k: usize) -> Vec<T> {
        (0..self.samples()).map(|i| self.row(i)[k]).collect()
    }

    #[inline]
    pub fn source(&self) -> &PermutationSource {
        &self.source
    }

    /// Draw a fresh block with the same number of permutations.
    pub fn reshuffle(&mut self) {
        self.reshuffle_with(self.permutations);
    }

    /// Draw a fresh block of `permutations` permutations, reusing storage
    /// where possible.
    pub fn reshuffle_with(&mut self, permutations: usize) {
        let n = self.samples();
        debug!("Drawing {} permutations of {} labels", permutations, n);
        self.permutations = permutations;
        self.values.clear();
        self.values.resize(n * permutations, T::default());
        if let Some(bits) = &mut self.bits {
            bits.resize_with(permutations, || BitSet::new(n));
        }
        for k in 0..permutations {
            self.scratch.copy_from_slice(&self.labels);
            self.source.shuffle(&mut self.scratch);
            for (i, &l) in self.scratch.iter().enumerate() {
                self.values[i * permutations + k] = l;
            }
            if let Some(bits) = &mut self.bits {
                let b = &mut bits[k];
                b.clear();
                for (i, &l) in self.scratch.iter().enumerate() {
                    // checked at construction
                    if l.bit() == Some(true) {
                        b.set(i);
                    }
                }
            }
        }
        trace!("Drew permutation block");
    }
}
