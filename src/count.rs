//! The three ways of aggregating the permuted labels of a code's carriers.
//!
//! * `bar`: popcount of the code bitset AND each permutation bitset.
//! * `git`: sum of the transposed matrix rows of the carriers.
//! * `rem`: start from a remembered result for a similar bitset and add or
//!   subtract the rows of the positions that changed.
//!
//! All three write one aggregate per permutation into `out` and agree
//! exactly for any membership.

#![allow(clippy::missing_safety_doc)]

use cfg_if::cfg_if;

use crate::{BitSet, Error, Label, PermutationMatrix};

/// Direct bit-count. Fails with [`Error::BitFormUnsupported`] if the
/// matrix has no bit form.
#[inline]
pub fn bar<T: Label>(
    matrix: &PermutationMatrix<T>,
    code: &BitSet,
    out: &mut [T],
) -> Result<(), Error> {
    cfg_if! {
        if #[cfg(target_arch = "x86_64")] {
            if is_x86_feature_detected!("popcnt") {
                return unsafe { bar_popcnt(matrix, code, out) };
            }
        }
    }
    bar_naive(matrix, code, out)
}

#[inline(always)]
pub fn bar_naive<T: Label>(
    matrix: &PermutationMatrix<T>,
    code: &BitSet,
    out: &mut [T],
) -> Result<(), Error> {
    let bits = matrix.bits().ok_or(Error::BitFormUnsupported)?;
    debug_assert_eq!(out.len(), bits.len());
    for (o, perm) in out.iter_mut().zip(bits.iter()) {
        *o = T::from_count(code.and_count(perm));
    }
    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "popcnt")]
pub unsafe fn bar_popcnt<T: Label>(
    matrix: &PermutationMatrix<T>,
    code: &BitSet,
    out: &mut [T],
) -> Result<(), Error> {
    bar_naive(matrix, code, out)
}

/// Indexed summation over the carrier rows.
#[inline]
pub fn git<T: Label>(matrix: &PermutationMatrix<T>, indices: &[u32], out: &mut [T]) {
    debug_assert_eq!(out.len(), matrix.permutations());
    out.fill(T::default());
    for &i in indices {
        let row = matrix.row(i as usize);
        for (o, v) in out.iter_mut().zip(row.iter()) {
            *o += *v;
        }
    }
}

/// Incremental reconstruction of the result for `code` from `previous`,
/// the result computed for `previous_code` on this same matrix.
#[inline]
pub fn rem<T: Label>(
    matrix: &PermutationMatrix<T>,
    code: &BitSet,
    previous_code: &BitSet,
    previous: &[T],
    out: &mut [T],
) {
    debug_assert_eq!(out.len(), previous.len());
    out.copy_from_slice(previous);
    code.for_each_change(previous_code, |i, gained| {
        let row = matrix.row(i);
        if gained {
            for (o, v) in out.iter_mut().zip(row.iter()) {
                *o += *v;
            }
        } else {
            for (o, v) in out.iter_mut().zip(row.iter()) {
                *o -= *v;
            }
        }
    });
}
