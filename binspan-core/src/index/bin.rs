//! Bins and their chunk lists

use super::binning;
use crate::chunk::Chunk;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A bin of one reference sequence with the chunks recorded against it.
///
/// Equality, ordering and hashing use only `(reference, number)`;
/// ordering is reference-major.
#[derive(Debug, Clone)]
pub struct Bin {
    reference: usize,
    number: u32,
    chunks: Vec<Chunk>,
}

impl Bin {
    pub fn new(reference: usize, number: u32) -> Self {
        Self {
            reference,
            number,
            chunks: Vec::new(),
        }
    }

    pub(crate) fn with_chunks(reference: usize, number: u32, chunks: Vec<Chunk>) -> Self {
        Self {
            reference,
            number,
            chunks,
        }
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Level of this bin in the hierarchy, or `None` for an out-of-range number
    pub fn level(&self) -> Option<u32> {
        binning::level_for_bin(self.number).ok()
    }

    /// Record a chunk, extending the last one when the two touch
    pub fn add_chunk(&mut self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        match self.chunks.last_mut() {
            Some(last) if last.overlaps(&chunk) || last.end() == chunk.start() => {
                *last = last.merge(&chunk);
            }
            _ => self.chunks.push(chunk),
        }
    }
}

impl PartialEq for Bin {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference && self.number == other.number
    }
}

impl Eq for Bin {}

impl PartialOrd for Bin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bin {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.reference, self.number).cmp(&(other.reference, other.number))
    }
}

impl Hash for Bin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
        self.number.hash(state);
    }
}
