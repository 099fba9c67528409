//! A single virtual-offset range

use crate::bgzf::VirtualOffset;
use crate::{Result, SpanError};
use std::fmt;

/// Empirical ratio of compressed to uncompressed bytes, used by
/// [`Chunk::size`]. Approximate; never use it for correctness decisions.
pub const AVERAGE_COMPRESSION_RATIO: f64 = 0.39;

/// Half-open range `[start, end)` of virtual offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    start: VirtualOffset,
    end: VirtualOffset,
}

impl Chunk {
    /// Create a chunk.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        assert!(start <= end, "chunk start {} is after end {}", start, end);
        Self { start, end }
    }

    /// Create a chunk from untrusted offsets (e.g. read from disk)
    pub fn try_new(start: VirtualOffset, end: VirtualOffset) -> Result<Self> {
        if start > end {
            return Err(SpanError::InvalidFormat(format!(
                "chunk start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Create from raw 64-bit offsets
    pub fn from_raw(start: u64, end: u64) -> Self {
        Self::new(VirtualOffset::from_raw(start), VirtualOffset::from_raw(end))
    }

    pub fn start(&self) -> VirtualOffset {
        self.start
    }

    pub fn end(&self) -> VirtualOffset {
        self.end
    }

    /// Zero-length chunks cover nothing
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether the two ranges share at least one offset
    pub fn overlaps(&self, other: &Chunk) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.end
            && other.start < self.end
    }

    /// Check whether one chunk ends exactly where the other starts
    pub fn is_adjacent_to(&self, other: &Chunk) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// Check whether `other` lies entirely within this chunk
    pub fn contains(&self, other: &Chunk) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest chunk covering both.
    ///
    /// # Panics
    ///
    /// Panics unless the chunks overlap or are adjacent.
    pub fn merge(&self, other: &Chunk) -> Chunk {
        assert!(
            self.overlaps(other) || self.is_adjacent_to(other),
            "cannot merge disjoint chunks {} and {}",
            self,
            other
        );
        Chunk {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Approximate number of uncompressed bytes covered.
    ///
    /// Whole blocks between the endpoints are scaled by
    /// [`AVERAGE_COMPRESSION_RATIO`]; only meant for diagnostics.
    pub fn size(&self) -> u64 {
        let block_span =
            (self.end.compressed_offset() - self.start.compressed_offset()) as f64;
        let scaled = (block_span / AVERAGE_COMPRESSION_RATIO).round() as i64;
        let offset_span = i64::from(self.end.uncompressed_offset())
            - i64::from(self.start.uncompressed_offset());
        (scaled + offset_span).max(0) as u64
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
