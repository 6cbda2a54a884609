//! Fixed-length bitsets used both for the bit-packed permutations and for
//! the dummy-coded membership of a marker code. Words are little-endian in
//! bit order: sample `i` lives in bit `i % 64` of word `i / 64`, and the
//! padding bits of the last word are always zero.

use aligned_vec::AVec;

pub const WORD_BITS: usize = 64;
const CACHE_LINE: usize = 64;

#[derive(Debug, Clone)]
pub struct BitSet {
    words: AVec<u64>,
    len:   usize,
    ones:  usize,
}

impl BitSet {
    pub fn new(len: usize) -> Self {
        let nwords = len.div_ceil(WORD_BITS);
        let mut words = AVec::with_capacity(CACHE_LINE, nwords);
        words.resize(nwords, 0);
        Self {
            words,
            len,
            ones: 0,
        }
    }

    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Self {
        let mut bits = Self::new(len);
        for i in 0..len {
            if f(i) {
                bits.set(i);
            }
        }
        bits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cached population count.
    #[inline]
    pub fn count(&self) -> usize {
        self.ones
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        let mask = 1u64 << (i % WORD_BITS);
        let word = &mut self.words[i / WORD_BITS];
        if *word & mask == 0 {
            *word |= mask;
            self.ones += 1;
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
        self.ones = 0;
    }

    /// Overwrite with the contents of `other`, which must have the same length.
    pub fn copy_from(&mut self, other: &BitSet) {
        debug_assert_eq!(self.len, other.len);
        self.words.copy_from_slice(&other.words);
        self.ones = other.ones;
    }

    #[inline]
    pub fn and_count(&self, other: &BitSet) -> usize {
        and_count_words(&self.words, &other.words)
    }

    #[inline]
    pub fn hamming(&self, other: &BitSet) -> usize {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Hamming distance if it is strictly below `bound`, giving up as soon as
    /// the running distance reaches the bound.
    #[inline]
    pub fn hamming_within(&self, other: &BitSet, bound: usize) -> Option<usize> {
        if self.ones.abs_diff(other.ones) >= bound {
            return None;
        }
        let mut distance = 0;
        for (a, b) in self.words.iter().zip(other.words.iter()) {
            distance += (a ^ b).count_ones() as usize;
            if distance >= bound {
                return None;
            }
        }
        Some(distance)
    }

    /// Visit every position where `self` differs from `previous`, passing
    /// `true` for positions set in `self` only and `false` for positions set
    /// in `previous` only.
    #[inline]
    pub fn for_each_change(&self, previous: &BitSet, mut f: impl FnMut(usize, bool)) {
        for (w, (cur, prev)) in self.words.iter().zip(previous.words.iter()).enumerate() {
            let diff = cur ^ prev;
            if diff == 0 {
                continue;
            }
            let mut gained = diff & cur;
            let mut lost = diff & prev;
            let base = w * WORD_BITS;
            while gained != 0 {
                f(base + gained.trailing_zeros() as usize, true);
                gained &= gained - 1;
            }
            while lost != 0 {
                f(base + lost.trailing_zeros() as usize, false);
                lost &= lost - 1;
            }
        }
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    None
                } else {
                    let bit = word.trailing_zeros() as usize;
                    word &= word - 1;
                    Some(w * WORD_BITS + bit)
                }
            })
        })
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.words[..] == other.words[..]
    }
}

impl Eq for BitSet {}

#[inline(always)]
pub fn and_count_words(a: &[u64], b: &[u64]) -> usize {
    let mut acc = 0;
    for (a, b) in a.iter().zip(b.iter()) {
        acc += (a & b).count_ones() as usize;
    }
    acc
}
