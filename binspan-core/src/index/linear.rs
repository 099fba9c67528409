//! Linear index: smallest record offset per 16 Kbp window

use super::binning::MIN_SHIFT;
use crate::bgzf::VirtualOffset;

/// Width of one linear-index window
pub const LINEAR_WINDOW_SIZE: u64 = 1 << MIN_SHIFT;

/// Per-reference array of minimum virtual offsets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearIndex {
    offsets: Vec<VirtualOffset>,
}

impl LinearIndex {
    pub fn new(offsets: Vec<VirtualOffset>) -> Self {
        Self { offsets }
    }

    pub fn offsets(&self) -> &[VirtualOffset] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Lower bound on the offset of any record overlapping a query starting at `start`
    pub fn min_offset(&self, start: u64) -> VirtualOffset {
        let window = (start >> MIN_SHIFT) as usize;
        self.offsets
            .get(window)
            .or_else(|| self.offsets.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Accumulates window minima while records are scanned
#[derive(Debug, Default)]
pub(crate) struct LinearIndexBuilder {
    offsets: Vec<Option<VirtualOffset>>,
}

impl LinearIndexBuilder {
    /// Note a record covering `[start, end)` that begins at `offset`
    pub fn record(&mut self, start: u64, end: u64, offset: VirtualOffset) {
        let first = (start >> MIN_SHIFT) as usize;
        let last = ((end.max(start + 1) - 1) >> MIN_SHIFT) as usize;
        if self.offsets.len() <= last {
            self.offsets.resize(last + 1, None);
        }
        for slot in &mut self.offsets[first..=last] {
            match slot {
                Some(existing) if *existing <= offset => {}
                _ => *slot = Some(offset),
            }
        }
    }

    /// Fill untouched windows from the window before them
    pub fn build(self) -> LinearIndex {
        let mut previous = VirtualOffset::default();
        let offsets = self
            .offsets
            .into_iter()
            .map(|slot| {
                let offset = slot.unwrap_or(previous);
                previous = offset;
                offset
            })
            .collect();
        LinearIndex { offsets }
    }
}
