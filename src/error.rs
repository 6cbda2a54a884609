use crate::{Encoding, Test};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("marker has {found} values but the permutation matrix holds {expected} samples")]
    SampleSizeMismatch { expected: usize, found: usize },
    #[error("invalid code {value} at sample {position}")]
    InvalidCode { value: u8, position: usize },
    #[error("unsupported code domain cardinality {0}")]
    UnsupportedCardinality(usize),
    #[error("code domain {0:?} repeats a code or contains the missing sentinel")]
    InvalidDomain(Vec<u8>),
    #[error("marker is {found:?} coded but the analysis expects {expected:?}")]
    EncodingMismatch { expected: Encoding, found: Encoding },
    #[error("observed statistics are not sorted in decreasing order at index {0}")]
    UnsortedStatistics(usize),
    #[error("null distribution is not sorted in increasing order at index {0}")]
    UnsortedNull(usize),
    #[error("step-down rank {found} folded out of order with {remaining} ranks remaining")]
    StepDownOrder { remaining: usize, found: usize },
    #[error("step-down block is incomplete, {0} ranks were not folded")]
    StepDownIncomplete(usize),
    #[error("permutation vector has length {found}, expected {expected}")]
    PermutationLengthMismatch { expected: usize, found: usize },
    #[error("bit-packed permutations require boolean labels")]
    BitFormUnsupported,
    #[error("test {0:?} is not defined for this label type")]
    UnsupportedTest(Test),
    #[error("no statistic tests configured")]
    NoTests,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
