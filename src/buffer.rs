use crate::{BitSet, Label};

#[derive(Debug, Clone)]
pub struct Entry<T: Label> {
    bits:   BitSet,
    result: Vec<T>,
}

impl<T: Label> Entry<T> {
    #[inline]
    pub fn bits(&self) -> &BitSet {
        &self.bits
    }

    #[inline]
    pub fn result(&self) -> &[T] {
        &self.result
    }
}

/// Bounded history of recently aggregated code bitsets and their results,
/// used to find a near-duplicate of the current bitset. Once full, each push
/// overwrites the oldest entry in place.
#[derive(Debug, Clone)]
pub struct SimilarityBuffer<T: Label> {
    capacity: usize,
    entries:  Vec<Entry<T>>,
    // slot overwritten by the next push once the buffer is full
    next:     usize,
}

impl<T: Label> SimilarityBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            next: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &Entry<T> {
        &self.entries[slot]
    }

    /// Slots from the most recent entry to the oldest.
    pub fn recent(&self) -> impl Iterator<Item = usize> {
        let len = self.entries.len();
        let oldest = if len < self.capacity { 0 } else { self.next };
        (0..len).map(move |i| (oldest + len - 1 - i) % len)
    }

    /// The most recent entry with the smallest Hamming distance to `bits`,
    /// provided that distance is strictly below `bound`.
    pub fn nearest(&self, bits: &BitSet, bound: usize) -> Option<(usize, usize)> {
        let mut best = None;
        let mut bound = bound;
        for slot in self.recent() {
            if let Some(distance) = bits.hamming_within(&self.entries[slot].bits, bound) {
                best = Some((slot, distance));
                if distance == 0 {
                    break;
                }
                bound = distance;
            }
        }
        best
    }

    /// Remember `result` as the aggregate of `bits`, evicting the oldest
    /// entry when full. A zero-capacity buffer remembers nothing.
    pub fn push(&mut self, bits: &BitSet, result: &[T]) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(Entry {
                bits:   bits.clone(),
                result: result.to_vec(),
            });
            self.next = self.entries.len() % self.capacity;
        } else {
            let entry = &mut self.entries[self.next];
            if entry.bits.len() == bits.len() {
                entry.bits.copy_from(bits);
            } else {
                entry.bits = bits.clone();
            }
            entry.result.clear();
            entry.result.extend_from_slice(result);
            self.next = (self.next + 1) % self.capacity;
        }
    }

    /// Forget every entry. Needed whenever the permutation matrix changes,
    /// since remembered results are only valid for the block they came from.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }
}
