//! Contiguous near-equal partitioning of a buffer across ranks

use std::ops::Range;

/// Per-rank element counts and offsets of one partitioned buffer.
///
/// `Partition::even` gives the first `total % parts` ranks one extra element,
/// so chunk sizes never differ by more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    counts: Vec<usize>,
    displs: Vec<usize>,
}

impl Partition {
    /// Split `total` elements over `parts` ranks (`parts == 0` is treated as 1)
    pub fn even(total: usize, parts: usize) -> Self {
        let parts = parts.max(1);
        let base = total / parts;
        let remainder = total % parts;
        let counts = (0..parts)
            .map(|rank| base + usize::from(rank < remainder))
            .collect();
        Self::from_counts(counts)
    }

    /// Partition with explicit per-rank counts
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let displs = counts
            .iter()
            .scan(0usize, |offset, &count| {
                let start = *offset;
                *offset += count;
                Some(start)
            })
            .collect();
        Self { counts, displs }
    }

    /// Element count per rank
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Offset of each rank's chunk in the whole buffer
    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    /// Number of ranks
    pub fn parts(&self) -> usize {
        self.counts.len()
    }

    /// Total element count
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Index range owned by `rank` (empty for out-of-range ranks)
    pub fn range(&self, rank: usize) -> Range<usize> {
        match (self.displs.get(rank), self.counts.get(rank)) {
            (Some(&start), Some(&count)) => start..start + count,
            _ => 0..0,
        }
    }

    /// Rank owning global index `index`
    pub fn owner_of(&self, index: usize) -> Option<usize> {
        (0..self.parts()).find(|&rank| self.range(rank).contains(&index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_goes_to_leading_ranks() {
        let p = Partition::even(10, 3);
        assert_eq!(p.counts(), &[4, 3, 3]);
        assert_eq!(p.displs(), &[0, 4, 7]);
        assert_eq!(p.range(2), 7..10);
    }

    #[test]
    fn test_more_ranks_than_elements() {
        let p = Partition::even(2, 4);
        assert_eq!(p.counts(), &[1, 1, 0, 0]);
        assert_eq!(p.range(3), 2..2);
        assert_eq!(p.owner_of(1), Some(1));
        assert_eq!(p.owner_of(2), None);
    }

    #[test]
    fn test_chunks_tile_the_buffer() {
        for total in 0..=12 {
            for parts in 1..=total + 1 {
                let p = Partition::even(total, parts);
                assert_eq!(p.parts(), parts);
                assert_eq!(p.total(), total);

                let mut next = 0;
                for rank in 0..parts {
                    let range = p.range(rank);
                    assert_eq!(range.start, next);
                    next = range.end;
                }
                assert_eq!(next, total);

                let max = p.counts().iter().max().copied().unwrap_or(0);
                let min = p.counts().iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "uneven split {:?}", p.counts());
            }
        }
    }

    #[test]
    fn test_zero_parts_is_single_rank() {
        assert_eq!(Partition::even(5, 0).counts(), &[5]);
    }
}
