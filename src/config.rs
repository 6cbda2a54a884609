use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{booster, Encoding, Error, Test, TrendOptions};

/// Settings of one permutation analysis. Every field has a default, so a
/// JSON document only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total number of permutations.
    pub permutations:       usize,
    /// Permutations drawn and held in memory at once.
    pub block_size:         usize,
    pub seed:               u64,
    /// Capacity of each code's similarity buffer.
    pub tail:               usize,
    /// Whether to build the bit-packed form of the permutations. Only
    /// possible for case/control labels.
    pub bit_form:           bool,
    pub tests:              Vec<Test>,
    pub trend:              TrendOptions,
    pub encoding:           Encoding,
    pub step_down:          bool,
    pub sparse_divisor:     usize,
    pub similarity_divisor: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            permutations:       10_000,
            block_size:         10_000,
            seed:               1,
            tail:               8,
            bit_form:           true,
            tests:              vec![Test::Trend],
            trend:              TrendOptions::default(),
            encoding:           Encoding::Genotype,
            step_down:          false,
            sparse_divisor:     booster::SPARSE_DIVISOR,
            similarity_divisor: booster::SIMILARITY_DIVISOR,
        }
    }
}

impl Config {
    /// Defaults suited to quantitative labels, which have no bit form and
    /// only support the regression test.
    pub fn quantitative() -> Self {
        Self {
            bit_form: false,
            tests: vec![Test::Regression],
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.tests.is_empty() {
            return Err(Error::NoTests);
        }
        if self.permutations == 0 {
            return Err(Error::InvalidConfig(
                "permutations must be at least 1".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig(
                "block_size must be at least 1".to_string(),
            ));
        }
        if self.sparse_divisor == 0 || self.similarity_divisor == 0 {
            return Err(Error::InvalidConfig(
                "threshold divisors must be at least 1".to_string(),
            ));
        }
        if self.trend.weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "trend weights must be finite, got {:?}",
                self.trend.weights
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration of process `rank` out of `size` independent
    /// processes. Permutations are split as evenly as possible, and each
    /// process draws from its own seed.
    pub fn partition(&self, rank: usize, size: usize) -> Result<Self, Error> {
        if size == 0 || rank >= size {
            return Err(Error::InvalidConfig(format!(
                "rank {rank} is not in a group of {size} processes"
            )));
        }
        let base = self.permutations / size;
        let extra = self.permutations % size;
        let permutations = base + usize::from(rank < extra);
        if permutations == 0 {
            return Err(Error::InvalidConfig(format!(
                "{} permutations cannot be split over {size} processes",
                self.permutations
            )));
        }
        Ok(Self {
            permutations,
            seed: self.seed.wrapping_add(rank as u64),
            ..self.clone()
        })
    }
}
