/// A 2xL contingency table: row 0 holds cases, row 1 controls, and column
/// `j` the subjects carrying code `j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table<const L: usize> {
    cases:    [u32; L],
    controls: [u32; L],
}

impl<const L: usize> Table<L> {
    pub fn new(cases: [u32; L], controls: [u32; L]) -> Self {
        Self { cases, controls }
    }

    /// Build a table from the per-code case counts and the per-code number of
    /// subjects. Controls are the remainder.
    #[inline(always)]
    pub fn from_cases(cases: &[u32; L], totals: &[u32; L]) -> Self {
        Self {
            cases:    *cases,
            controls: std::array::from_fn(|j| totals[j] - cases[j]),
        }
    }

    #[inline]
    pub fn cases(&self) -> &[u32; L] {
        &self.cases
    }

    #[inline]
    pub fn controls(&self) -> &[u32; L] {
        &self.controls
    }

    #[inline]
    pub fn column(&self, j: usize) -> u32 {
        self.cases[j] + self.controls[j]
    }

    #[inline]
    pub fn case_total(&self) -> u32 {
        self.cases.iter().sum()
    }

    #[inline]
    pub fn control_total(&self) -> u32 {
        self.controls.iter().sum()
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.case_total() + self.control_total()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_from_cases() {
        let table = Table::from_cases(&[10, 20, 30], &[40, 40, 40]);
        assert_eq!(table.controls(), &[30, 20, 10]);
        assert_eq!(table.case_total(), 60);
        assert_eq!(table.control_total(), 60);
        assert_eq!(table.column(1), 40);
        assert_eq!(table.total(), 120);
    }

    #[test]
    fn test_empty_column() {
        let table = Table::<2>::from_cases(&[0, 3], &[0, 5]);
        assert_eq!(table.column(0), 0);
        assert_eq!(table.controls(), &[0, 2]);
    }
}
