//! Adaptive choice between the counting algorithms for every code of a
//! marker.
//!
//! Consecutive markers tend to be in linkage, so a code's bitset is often a
//! near-copy of one seen a few markers earlier. Each slot keeps a
//! [`SimilarityBuffer`] of recent bitsets and results; a close enough match
//! is patched with `rem`, otherwise rare codes use `git` and common ones
//! `bar`. The costliest code of the marker is not counted at all: since the
//! codes partition the subjects, its aggregate is the label total minus the
//! other codes' aggregates.

use tracing::trace;

use crate::{count, CodeMembership, Error, Label, PermutationMatrix, SimilarityBuffer};

/// Default divisor of the sample size below which a code is considered
/// sparse enough for indexed summation instead of direct bit-counting.
/// Empirically tuned.
pub const SPARSE_DIVISOR: usize = 6;
/// Default divisor of the sample size capping the Hamming distance at which
/// incremental reconstruction is still preferred. Empirically tuned.
pub const SIMILARITY_DIVISOR: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPath {
    /// No carriers, the aggregate is zero.
    Empty,
    /// Direct bit-count.
    Bar,
    /// Indexed summation.
    Git,
    /// Incremental reconstruction from a buffered entry.
    Rem { slot: usize, distance: usize },
    /// Derived from the label total and the other codes.
    Skip,
}

/// How many code aggregates each path produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathTally {
    pub empty: u64,
    pub bar:   u64,
    pub git:   u64,
    pub rem:   u64,
    pub skip:  u64,
}

impl PathTally {
    fn record(&mut self, path: CountPath) {
        match path {
            CountPath::Empty => self.empty += 1,
            CountPath::Bar => self.bar += 1,
            CountPath::Git => self.git += 1,
            CountPath::Rem { .. } => self.rem += 1,
            CountPath::Skip => self.skip += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.empty + self.bar + self.git + self.rem + self.skip
    }
}

#[derive(Debug, Clone, Copy)]
struct Plan {
    path:  CountPath,
    // estimated number of matrix rows touched
    cost:  usize,
    count: usize,
}

#[derive(Debug, Clone)]
pub struct Booster<T: Label> {
    buffers:              Vec<SimilarityBuffer<T>>,
    sparse_threshold:     usize,
    similarity_threshold: usize,
    plans:                Vec<Plan>,
    tally:                PathTally,
}

impl<T: Label> Booster<T> {
    /// A dispatcher for markers with `slots` codes (missing included) over
    /// `samples` subjects, remembering up to `tail` results per slot.
    pub fn new(
        slots: usize,
        samples: usize,
        tail: usize,
        sparse_divisor: usize,
        similarity_divisor: usize,
    ) -> Self {
        Self {
            buffers: (0..slots).map(|_| SimilarityBuffer::new(tail)).collect(),
            sparse_threshold: samples / sparse_divisor.max(1),
            similarity_threshold: samples / similarity_divisor.max(1),
            plans: Vec::with_capacity(slots),
            tally: PathTally::default(),
        }
    }

    #[inline]
    pub fn sparse_threshold(&self) -> usize {
        self.sparse_threshold
    }

    #[inline]
    pub fn similarity_threshold(&self) -> usize {
        self.similarity_threshold
    }

    #[inline]
    pub fn buffer(&self, slot: usize) -> &SimilarityBuffer<T> {
        &self.buffers[slot]
    }

    #[inline]
    pub fn tally(&self) -> PathTally {
        self.tally
    }

    pub fn take_tally(&mut self) -> PathTally {
        std::mem::take(&mut self.tally)
    }

    /// Forget every remembered result. Must be called whenever the
    /// permutation matrix is reshuffled.
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    /// The paths chosen for the last marker, by slot.
    pub fn paths(&self) -> impl Iterator<Item = CountPath> + '_ {
        self.plans.iter().map(|p| p.path)
    }

    fn plan(&mut self, matrix: &PermutationMatrix<T>, memberships: &[CodeMembership]) -> Option<usize> {
        let has_bits = matrix.has_bits();
        self.plans.clear();
        for (slot, membership) in memberships.iter().enumerate() {
            let count = membership.count();
            if count == 0 {
                self.plans.push(Plan {
                    path: CountPath::Empty,
                    cost: 0,
                    count,
                });
                continue;
            }
            // reconstruction only pays off if it touches fewer rows than
            // summing the carriers, and with bit form fewer than bar would
            let bound = if has_bits {
                count.min(self.similarity_threshold)
            } else {
                count
            };
            let plan = match self.buffers[slot].nearest(membership.bits(), bound) {
                Some((entry, distance)) => Plan {
                    path: CountPath::Rem {
                        slot: entry,
                        distance,
                    },
                    cost: distance,
                    count,
                },
                None if !has_bits || count < self.sparse_threshold => Plan {
                    path: CountPath::Git,
                    cost: count,
                    count,
                },
                None => Plan {
                    path: CountPath::Bar,
                    cost: self.sparse_threshold,
                    count,
                },
            };
            self.plans.push(plan);
        }
        // the worst code is the costliest, ties going to the most frequent
        let skip = self
            .plans
            .iter()
            .enumerate()
            .filter(|(_, p)| p.path != CountPath::Empty)
            .max_by(|(i, a), (j, b)| {
                (a.cost, a.count)
                    .cmp(&(b.cost, b.count))
                    // prefer the lowest slot on a full tie
                    .then_with(|| j.cmp(i))
            })
            .map(|(i, _)| i);
        if let Some(skip) = skip {
            self.plans[skip].path = CountPath::Skip;
        }
        skip
    }

    /// Aggregate the permuted labels of every slot of one marker into `out`,
    /// one vector of length `matrix.permutations()` per slot.
    pub fn count(
        &mut self,
        matrix: &PermutationMatrix<T>,
        memberships: &[CodeMembership],
        out: &mut [Vec<T>],
    ) -> Result<(), Error> {
        debug_assert_eq!(memberships.len(), self.buffers.len());
        debug_assert_eq!(out.len(), memberships.len());
        let p = matrix.permutations();
        let skip = self.plan(matrix, memberships);

        for (slot, membership) in memberships.iter().enumerate() {
            let path = self.plans[slot].path;
            self.tally.record(path);
            let result = &mut out[slot];
            result.resize(p, T::default());
            match path {
                CountPath::Skip => continue,
                CountPath::Empty => result.fill(T::default()),
                CountPath::Bar => count::bar(matrix, membership.bits(), result)?,
                CountPath::Git => {
                    count::git(matrix, membership.indices(), result);
                    self.buffers[slot].push(membership.bits(), result);
                },
                CountPath::Rem { slot: entry, .. } => {
                    let remembered = self.buffers[slot].get(entry);
                    count::rem(
                        matrix,
                        membership.bits(),
                        remembered.bits(),
                        remembered.result(),
                        result,
                    );
                    self.buffers[slot].push(membership.bits(), result);
                },
            }
        }

        if let Some(skip) = skip {
            let mut derived = std::mem::take(&mut out[skip]);
            derived.fill(matrix.total());
            for (slot, other) in out.iter().enumerate() {
                if slot == skip {
                    continue;
                }
                for (d, o) in derived.iter_mut().zip(other.iter()) {
                    *d -= *o;
                }
            }
            self.buffers[skip].push(memberships[skip].bits(), &derived);
            out[skip] = derived;
        }
        trace!("Boosted marker with paths {:?}", self.plans);
        Ok(())
    }
}
