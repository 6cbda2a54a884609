use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Seeded source of label shuffles. Two sources built from the same seed
/// produce the same sequence of permutations.
#[derive(Debug, Clone)]
pub struct PermutationSource {
    seed: u64,
    rng:  StdRng,
}

impl PermutationSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Shuffle `data` in place (Fisher-Yates). Empty slices are left alone.
    #[inline]
    pub fn shuffle<T>(&mut self, data: &mut [T]) {
        data.shuffle(&mut self.rng);
    }

    /// Restart the stream from a new seed.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Restart the stream from the current seed.
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
