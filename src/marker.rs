use serde::{Deserialize, Serialize};

use crate::{BitSet, Error};

/// Marker value for a subject with no call.
pub const MISSING: u8 = u8::MAX;

/// How marker values are coded, which fixes the shape of the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Genotypes 0, 1 and 2, giving 2x3 tables.
    #[default]
    Genotype,
    /// Alleles 0 and 1, giving 2x2 tables.
    Allelic,
}

impl Encoding {
    pub fn from_cardinality(codes: usize) -> Result<Self, Error> {
        match codes {
            3 => Ok(Self::Genotype),
            2 => Ok(Self::Allelic),
            _ => Err(Error::UnsupportedCardinality(codes)),
        }
    }

    /// Number of non-missing codes.
    #[inline]
    pub fn codes(&self) -> usize {
        match self {
            Self::Genotype => 3,
            Self::Allelic => 2,
        }
    }

    /// Number of membership slots, one per code plus the missing code.
    #[inline]
    pub fn slots(&self) -> usize {
        self.codes() + 1
    }

    /// The conventional value domain, codes `0..codes()`.
    #[inline]
    pub fn domain(&self) -> &'static [u8] {
        match self {
            Self::Genotype => &[0, 1, 2],
            Self::Allelic => &[0, 1],
        }
    }
}

/// Raw values of one marker and the set of codes they are drawn from.
/// Subjects with value `domain[j]` go to slot `j`, [`MISSING`] to the last
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker<'a> {
    pub values: &'a [u8],
    pub domain: &'a [u8],
}

impl<'a> Marker<'a> {
    #[inline]
    pub fn new(values: &'a [u8], domain: &'a [u8]) -> Self {
        Self { values, domain }
    }

    /// Genotypes coded 0, 1 and 2.
    #[inline]
    pub fn genotype(values: &'a [u8]) -> Self {
        Self::new(values, Encoding::Genotype.domain())
    }

    /// Alleles coded 0 and 1.
    #[inline]
    pub fn allelic(values: &'a [u8]) -> Self {
        Self::new(values, Encoding::Allelic.domain())
    }

    /// The encoding implied by the size of the domain.
    pub fn encoding(&self) -> Result<Encoding, Error> {
        let encoding = Encoding::from_cardinality(self.domain.len())?;
        let mut seen = [false; 256];
        for &d in self.domain {
            if d == MISSING || seen[d as usize] {
                return Err(Error::InvalidDomain(self.domain.to_vec()));
            }
            seen[d as usize] = true;
        }
        Ok(encoding)
    }
}

/// Which subjects carry one code of one marker, as both an index list and
/// a bitset. `indices.len() == bits.count()` always holds.
#[derive(Debug, Clone)]
pub struct CodeMembership {
    indices: Vec<u32>,
    bits:    BitSet,
}

impl CodeMembership {
    pub fn new(samples: usize) -> Self {
        Self {
            indices: Vec::new(),
            bits:    BitSet::new(samples),
        }
    }

    pub fn from_indices(samples: usize, indices: &[u32]) -> Self {
        let mut membership = Self::new(samples);
        for &i in indices {
            membership.insert(i);
        }
        membership
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn bits(&self) -> &BitSet {
        &self.bits
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline(always)]
    fn insert(&mut self, i: u32) {
        if !self.bits.get(i as usize) {
            self.indices.push(i);
            self.bits.set(i as usize);
        }
    }

    fn clear(&mut self) {
        self.indices.clear();
        self.bits.clear();
    }
}

/// Memberships of every slot of one marker. The last slot always belongs to
/// [`MISSING`]. Reused from marker to marker to keep allocations.
#[derive(Debug, Clone)]
pub struct Memberships {
    encoding: Encoding,
    samples:  usize,
    slots:    Vec<CodeMembership>,
}

impl Memberships {
    pub fn new(encoding: Encoding, samples: usize) -> Self {
        Self {
            encoding,
            samples,
            slots: (0..encoding.slots())
                .map(|_| CodeMembership::new(samples))
                .collect(),
        }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    #[inline]
    pub fn slots(&self) -> &[CodeMembership] {
        &self.slots
    }

    #[inline]
    pub fn missing(&self) -> &CodeMembership {
        &self.slots[self.encoding.codes()]
    }

    /// Number of subjects carrying each non-missing code.
    pub fn totals<const L: usize>(&self) -> [u32; L] {
        debug_assert_eq!(L, self.encoding.codes());
        std::array::from_fn(|j| self.slots[j].count() as u32)
    }

    /// Rebuild every slot from the raw values of one marker. The marker's
    /// domain must have as many codes as this encoding.
    pub fn fill(&mut self, marker: Marker<'_>) -> Result<(), Error> {
        let values = marker.values;
        if values.len() != self.samples {
            return Err(Error::SampleSizeMismatch {
                expected: self.samples,
                found:    values.len(),
            });
        }
        let encoding = marker.encoding()?;
        if encoding != self.encoding {
            return Err(Error::EncodingMismatch {
                expected: self.encoding,
                found:    encoding,
            });
        }
        let codes = self.encoding.codes();
        // u8::MAX marks values outside the domain
        let mut slot_of = [u8::MAX; 256];
        for (j, &d) in marker.domain.iter().enumerate() {
            slot_of[d as usize] = j as u8;
        }
        slot_of[MISSING as usize] = codes as u8;

        for slot in &mut self.slots {
            slot.clear();
        }
        for (i, &v) in values.iter().enumerate() {
            let slot = slot_of[v as usize];
            if slot == u8::MAX {
                return Err(Error::InvalidCode {
                    value:    v,
                    position: i,
                });
            }
            self.slots[slot as usize].insert(i as u32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(Encoding::from_cardinality(3).unwrap(), Encoding::Genotype);
        assert_eq!(Encoding::from_cardinality(2).unwrap(), Encoding::Allelic);
        assert!(matches!(
            Encoding::from_cardinality(4),
            Err(Error::UnsupportedCardinality(4))
        ));
        assert_eq!(Encoding::Genotype.slots(), 4);
    }

    #[test]
    fn test_fill() {
        let mut m = Memberships::new(Encoding::Genotype, 6);
        m.fill(Marker::genotype(&[0, 1, 2, MISSING, 1, 1])).unwrap();
        assert_eq!(m.slots()[0].indices(), &[0]);
        assert_eq!(m.slots()[1].indices(), &[1, 4, 5]);
        assert_eq!(m.slots()[2].indices(), &[2]);
        assert_eq!(m.missing().indices(), &[3]);
        for slot in m.slots() {
            assert_eq!(slot.count(), slot.bits().count());
            for &i in slot.indices() {
                assert!(slot.bits().get(i as usize));
            }
        }
        assert_eq!(m.totals::<3>(), [1, 3, 1]);

        // refilling clears the previous marker
        m.fill(Marker::genotype(&[2, 2, 2, 2, 2, 2])).unwrap();
        assert!(m.slots()[1].is_empty());
        assert!(m.missing().is_empty());
        assert_eq!(m.slots()[2].count(), 6);
    }

    #[test]
    fn test_fill_errors() {
        let mut m = Memberships::new(Encoding::Allelic, 3);
        assert!(matches!(
            m.fill(Marker::allelic(&[0, 1])),
            Err(Error::SampleSizeMismatch {
                expected: 3,
                found:    2,
            })
        ));
        assert!(matches!(
            m.fill(Marker::allelic(&[0, 2, 1])),
            Err(Error::InvalidCode {
                value:    2,
                position: 1,
            })
        ));
    }

    #[test]
    fn test_from_indices() {
        let m = CodeMembership::from_indices(10, &[1, 3, 9]);
        assert_eq!(m.count(), 3);
        assert_eq!(m.bits().iter_ones().collect::<Vec<_>>(), vec![1, 3, 9]);
    }

    #[test]
    fn test_fill_maps_domain_to_slots() {
        let mut m = Memberships::new(Encoding::Allelic, 5);
        // alleles coded as nucleotides
        m.fill(Marker::new(&[b'A', b'G', MISSING, b'G', b'A'], b"AG"))
            .unwrap();
        assert_eq!(m.slots()[0].indices(), &[0, 4]);
        assert_eq!(m.slots()[1].indices(), &[1, 3]);
        assert_eq!(m.missing().indices(), &[2]);
        assert!(matches!(
            m.fill(Marker::new(&[b'A', b'C', b'A', b'A', b'A'], b"AG")),
            Err(Error::InvalidCode {
                value:    b'C',
                position: 1,
            })
        ));
    }

    #[test]
    fn test_fill_domain_errors() {
        let mut m = Memberships::new(Encoding::Genotype, 4);
        // a two-code marker cannot fill genotype tables
        assert!(matches!(
            m.fill(Marker::allelic(&[0, 1, 1, 0])),
            Err(Error::EncodingMismatch {
                expected: Encoding::Genotype,
                found:    Encoding::Allelic,
            })
        ));
        assert!(matches!(
            m.fill(Marker::new(&[0, 1, 2, 3], &[0, 1, 2, 3])),
            Err(Error::UnsupportedCardinality(4))
        ));
        assert!(matches!(
            m.fill(Marker::new(&[0, 1, 1, 0], &[0, 1, 1])),
            Err(Error::InvalidDomain(_))
        ));
        assert!(matches!(
            m.fill(Marker::new(&[0, 1, 1, 0], &[0, 1, MISSING])),
            Err(Error::InvalidDomain(_))
        ));
    }
}
