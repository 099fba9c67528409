//! Normalized chunk sets and their set algebra

use super::Chunk;
use crate::bgzf::VirtualOffset;
use crate::{Result, SpanError};
use std::fmt;
use tracing::error;

/// Sorted, non-overlapping, non-adjacent set of non-empty chunks
///
/// Every constructor and operation re-establishes that shape, so a span can
/// be handed to a reader that seeks chunk by chunk without re-reading bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSpan {
    chunks: Vec<Chunk>,
}

impl FileSpan {
    /// Build a span from arbitrary chunks, coalescing overlaps and adjacency
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self::from_normalized(normalize(chunks.into_iter().collect()))
    }

    /// The span covering nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap the output of an operation, verifying its shape in every build.
    ///
    /// A malformed result is logged as an internal error and re-normalized,
    /// so callers never see a span that breaks the invariants.
    fn from_normalized(chunks: Vec<Chunk>) -> Self {
        let span = Self { chunks };
        match span.check_invariants() {
            Ok(()) => span,
            Err(e) => {
                error!("{}; re-normalizing {}", e, span);
                Self {
                    chunks: normalize(span.chunks),
                }
            }
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Check whether some chunk covers `offset`
    pub fn contains_offset(&self, offset: VirtualOffset) -> bool {
        let idx = self.chunks.partition_point(|c| c.end() <= offset);
        self.chunks
            .get(idx)
            .is_some_and(|c| c.start() <= offset && offset < c.end())
    }

    /// Check whether `chunk` lies entirely within one chunk of the span
    pub fn contains(&self, chunk: &Chunk) -> bool {
        if chunk.is_empty() {
            return true;
        }
        let idx = self.chunks.partition_point(|c| c.end() <= chunk.start());
        self.chunks.get(idx).is_some_and(|c| c.contains(chunk))
    }

    /// Minimal span covering both inputs
    pub fn union(&self, other: &FileSpan) -> FileSpan {
        let mut all = Vec::with_capacity(self.chunks.len() + other.chunks.len());
        all.extend_from_slice(&self.chunks);
        all.extend_from_slice(&other.chunks);
        Self::from_normalized(normalize(all))
    }

    /// Offsets covered by both inputs
    pub fn intersection(&self, other: &FileSpan) -> FileSpan {
        let mut result = Vec::new();
        let mut left = self.chunks.iter().copied();
        let mut right = other.chunks.iter().copied();
        let mut l = left.next();
        let mut r = right.next();

        while let (Some(a), Some(b)) = (l, r) {
            if a.overlaps(&b) {
                let start = a.start().max(b.start());
                let end = a.end().min(b.end());
                result.push(Chunk::new(start, end));
                // keep whatever lies past the emitted range
                l = if a.end() > end {
                    Some(Chunk::new(end, a.end()))
                } else {
                    left.next()
                };
                r = if b.end() > end {
                    Some(Chunk::new(end, b.end()))
                } else {
                    right.next()
                };
            } else if a.end() <= b.end() {
                l = left.next();
            } else {
                r = right.next();
            }
        }

        Self::from_normalized(result)
    }

    /// Offsets covered by `self` but not by `other`
    pub fn minus(&self, other: &FileSpan) -> FileSpan {
        let mut result = Vec::new();
        let mut left = self.chunks.iter().copied();
        let mut right = other.chunks.iter().copied();
        let mut l = left.next();
        let mut r = right.next();

        while let Some(a) = l {
            let Some(b) = r else {
                result.push(a);
                l = left.next();
                continue;
            };

            if b.end() <= a.start() {
                r = right.next();
            } else if a.end() <= b.start() {
                result.push(a);
                l = left.next();
            } else {
                if a.start() < b.start() {
                    result.push(Chunk::new(a.start(), b.start()));
                }
                if a.end() > b.end() {
                    l = Some(Chunk::new(b.end(), a.end()));
                    r = right.next();
                } else {
                    l = left.next();
                }
            }
        }

        Self::from_normalized(result)
    }

    /// Approximate uncompressed bytes covered; diagnostics only
    pub fn size(&self) -> u64 {
        self.chunks.iter().map(Chunk::size).sum()
    }

    /// Verify the normalized shape.
    ///
    /// A violation is a bug in the algebra, reported as an internal error.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(empty) = self.chunks.iter().find(|c| c.is_empty()) {
            return Err(SpanError::Internal(format!(
                "span holds empty chunk {}",
                empty
            )));
        }
        for pair in self.chunks.windows(2) {
            if pair[0].end() >= pair[1].start() {
                return Err(SpanError::Internal(format!(
                    "span chunks {} and {} overlap, touch or are unsorted",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

/// Drop empty chunks, sort by start, and coalesce overlapping or adjacent runs.
fn normalize(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.retain(|c| !c.is_empty());
    chunks.sort_by_key(|c| (c.start(), c.end()));

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.start() <= current.end() => {
                *current = current.merge(&chunk);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

impl<'a> IntoIterator for &'a FileSpan {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

impl IntoIterator for FileSpan {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

impl FromIterator<Chunk> for FileSpan {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        FileSpan::new(iter)
    }
}

impl fmt::Display for FileSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", chunk)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn span(ranges: &[(u64, u64)]) -> FileSpan {
        ranges.iter().map(|&(s, e)| Chunk::from_raw(s, e)).collect()
    }

    fn raw(span: &FileSpan) -> Vec<(u64, u64)> {
        span.chunks()
            .iter()
            .map(|c| (c.start().as_raw(), c.end().as_raw()))
            .collect()
    }

    fn covered(span: &FileSpan) -> BTreeSet<u64> {
        span.chunks()
            .iter()
            .flat_map(|c| c.start().as_raw()..c.end().as_raw())
            .collect()
    }

    fn random_span(rng: &mut StdRng) -> FileSpan {
        let count = rng.gen_range(0..8);
        (0..count)
            .map(|_| {
                let start = rng.gen_range(0..200u64);
                let len = rng.gen_range(0..40u64);
                Chunk::from_raw(start, start + len)
            })
            .collect()
    }

    #[test]
    fn test_adjacent_spans_union_into_one_chunk() {
        let a = span(&[(0, 100)]);
        let b = span(&[(100, 200)]);
        assert_eq!(raw(&a.union(&b)), vec![(0, 200)]);
    }

    #[test]
    fn test_new_normalizes() {
        let s = span(&[(50, 60), (0, 10), (5, 20), (20, 25), (40, 40)]);
        assert_eq!(raw(&s), vec![(0, 25), (50, 60)]);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_intersection_splits_at_boundaries() {
        let a = span(&[(0, 100), (150, 300)]);
        let b = span(&[(50, 60), (90, 200), (250, 260)]);
        assert_eq!(
            raw(&a.intersection(&b)),
            vec![(50, 60), (90, 100), (150, 200), (250, 260)]
        );
    }

    #[test]
    fn test_minus_emits_prefixes_and_remainders() {
        let a = span(&[(0, 100), (150, 300)]);
        let b = span(&[(20, 30), (90, 160), (400, 500)]);
        assert_eq!(
            raw(&a.minus(&b)),
            vec![(0, 20), (30, 90), (160, 300)]
        );
        assert!(a.minus(&a).is_empty());
        assert_eq!(a.minus(&FileSpan::empty()), a);
        assert!(FileSpan::empty().minus(&a).is_empty());
    }

    #[test]
    fn test_zero_length_chunk_contributes_nothing() {
        let a = span(&[(0, 100)]);
        let zero = span(&[(50, 50)]);
        assert!(zero.is_empty());
        assert_eq!(a.union(&zero), a);
        assert!(a.intersection(&zero).is_empty());
        assert_eq!(a.minus(&zero), a);
    }

    #[test]
    fn test_contains_offset() {
        let s = span(&[(10, 20), (30, 40)]);
        assert!(s.contains_offset(VirtualOffset::from_raw(10)));
        assert!(s.contains_offset(VirtualOffset::from_raw(35)));
        assert!(!s.contains_offset(VirtualOffset::from_raw(20)));
        assert!(!s.contains_offset(VirtualOffset::from_raw(5)));
        assert!(!s.contains_offset(VirtualOffset::from_raw(40)));

        assert!(s.contains(&Chunk::from_raw(12, 20)));
        assert!(!s.contains(&Chunk::from_raw(15, 35)));
        assert!(s.contains(&Chunk::from_raw(25, 25)));
    }

    #[test]
    fn test_check_invariants_reports_bad_shape() {
        let bad = FileSpan {
            chunks: vec![Chunk::from_raw(0, 10), Chunk::from_raw(10, 20)],
        };
        assert!(bad.check_invariants().unwrap_err().is_internal());
    }

    #[test]
    fn test_malformed_operation_output_is_repaired() {
        let repaired = FileSpan::from_normalized(vec![
            Chunk::from_raw(30, 40),
            Chunk::from_raw(0, 10),
            Chunk::from_raw(5, 20),
            Chunk::from_raw(50, 50),
        ]);
        assert!(repaired.check_invariants().is_ok());
        assert_eq!(raw(&repaired), vec![(0, 20), (30, 40)]);
    }

    #[test]
    fn test_set_laws_on_random_spans() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let x = random_span(&mut rng);
            let y = random_span(&mut rng);

            let union = x.union(&y);
            let inter = x.intersection(&y);
            let diff = x.minus(&y);

            assert_eq!(union, y.union(&x));
            assert!(x.minus(&x).is_empty());
            assert_eq!(x.union(&inter), x);

            for result in [&union, &inter, &diff] {
                assert!(result.check_invariants().is_ok(), "{}", result);
            }

            let cx = covered(&x);
            let cy = covered(&y);
            assert_eq!(covered(&union), cx.union(&cy).copied().collect());
            assert_eq!(covered(&inter), cx.intersection(&cy).copied().collect());
            assert_eq!(covered(&diff), cx.difference(&cy).copied().collect());
        }
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let a = span(&[(0, 100)]);
        let b = span(&[(50, 150)]);
        let (a0, b0) = (a.clone(), b.clone());
        let _ = a.union(&b);
        let _ = a.intersection(&b);
        let _ = a.minus(&b);
        assert_eq!(a, a0);
        assert_eq!(b, b0);
    }

    #[test]
    fn test_size_sums_chunks() {
        let s = span(&[(0, 100), (200, 250)]);
        assert_eq!(s.size(), 150);
    }
}
