mod analysis;
mod bits;
mod booster;
mod buffer;
mod config;
pub mod count;
mod error;
mod label;
mod marker;
mod permutation;
mod pvalue;
mod random;
pub mod stats;
mod table;

pub use crate::{
    analysis::*, bits::*, booster::*, buffer::*, config::*, error::*, label::*, marker::*,
    permutation::*, pvalue::*, random::*, stats::*, table::*,
};
