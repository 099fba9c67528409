//! Binning index over a block-compressed source
//!
//! Records are placed in the smallest bin of a six-level hierarchy that fully
//! contains them. Each bin keeps the chunks of virtual offsets holding its
//! records, and each reference sequence keeps a linear index of the smallest
//! record offset per 16 Kbp window. A query visits every bin overlapping the
//! interval, drops chunks that end before the linear-index bound and returns
//! the union of the rest.

mod bin;
mod binning;
mod builder;
mod linear;
mod sidecar;

pub use bin::Bin;
pub use binning::{
    bin_for_interval, bins_overlapping, first_locus_in_bin, last_locus_in_bin, level_for_bin,
    parent_bin, LEVEL_STARTS, MAX_BINS, MAX_COORDINATE, MAX_LEVEL, MIN_SHIFT,
};
pub use builder::BinIndexBuilder;
pub use linear::{LinearIndex, LINEAR_WINDOW_SIZE};
pub use sidecar::{decode_sidecar, encode_sidecar, SidecarContents, FORMAT_VERSION, SIDECAR_MAGIC};

use crate::chunk::{Chunk, FileSpan};
use crate::types::{check_interval, DictionaryValidation, SequenceDictionary};
use crate::{Result, SpanError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

/// Bins and linear index of one reference sequence
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    bins: BTreeMap<u32, Bin>,
    linear: LinearIndex,
}

impl ReferenceIndex {
    pub(crate) fn new(bins: BTreeMap<u32, Bin>, linear: LinearIndex) -> Self {
        Self { bins, linear }
    }

    /// Bins in ascending bin-number order
    pub fn bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins.values()
    }

    pub fn bin(&self, number: u32) -> Option<&Bin> {
        self.bins.get(&number)
    }

    pub fn linear(&self) -> &LinearIndex {
        &self.linear
    }
}

/// Immutable chunk/bin index of one source file
#[derive(Debug, Clone, Default)]
pub struct BinIndex {
    sequence_names: Vec<String>,
    name_to_ref: HashMap<String, usize>,
    references: Vec<ReferenceIndex>,
    unplaced_count: u64,
}

impl BinIndex {
    pub(crate) fn from_parts(
        sequence_names: Vec<String>,
        references: Vec<ReferenceIndex>,
        unplaced_count: u64,
    ) -> Result<Self> {
        if sequence_names.len() != references.len() {
            return Err(SpanError::InvalidFormat(format!(
                "{} sequence names for {} references",
                sequence_names.len(),
                references.len()
            )));
        }
        let mut name_to_ref = HashMap::with_capacity(sequence_names.len());
        for (i, name) in sequence_names.iter().enumerate() {
            if name_to_ref.insert(name.clone(), i).is_some() {
                return Err(SpanError::InvalidFormat(format!(
                    "sequence '{}' appears twice in index",
                    name
                )));
            }
        }
        Ok(Self {
            sequence_names,
            name_to_ref,
            references,
            unplaced_count,
        })
    }

    /// Sequence names in reference-id order
    pub fn sequence_names(&self) -> &[String] {
        &self.sequence_names
    }

    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.name_to_ref.get(name).copied()
    }

    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    /// Records that carried no coordinates
    pub fn unplaced_count(&self) -> u64 {
        self.unplaced_count
    }

    pub fn bin_count(&self) -> usize {
        self.references.iter().map(|r| r.bins.len()).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.references
            .iter()
            .flat_map(|r| r.bins.values())
            .map(|b| b.chunks().len())
            .sum()
    }

    /// Chunks that may hold records overlapping `[start, end)` on `sequence`.
    ///
    /// Unknown sequences and empty intervals give an empty span.
    pub fn chunks_for_interval(&self, sequence: &str, start: u64, end: u64) -> Result<FileSpan> {
        check_interval(start, end)?;
        let Some(reference) = self.reference_id(sequence).map(|id| &self.references[id]) else {
            return Ok(FileSpan::empty());
        };

        let min_offset = reference.linear.min_offset(start);
        let chunks: Vec<Chunk> = bins_overlapping(start, end)?
            .into_iter()
            .filter_map(|number| reference.bins.get(&number))
            .flat_map(|bin| bin.chunks().iter().copied())
            .filter(|chunk| chunk.end() > min_offset)
            .collect();

        Ok(FileSpan::new(chunks))
    }

    /// Union of a bin's chunks and those of all its ancestors
    pub fn span_for_bin(&self, reference: usize, bin: u32) -> Result<FileSpan> {
        level_for_bin(bin)?;
        let Some(reference) = self.references.get(reference) else {
            return Ok(FileSpan::empty());
        };

        let mut chunks = Vec::new();
        let mut current = Some(bin);
        while let Some(number) = current {
            if let Some(b) = reference.bins.get(&number) {
                chunks.extend_from_slice(b.chunks());
            }
            current = parent_bin(number)?;
        }
        Ok(FileSpan::new(chunks))
    }

    /// Chunks recorded against one bin, empty when the bin holds nothing
    pub fn contents_of_bin(&self, reference: usize, bin: u32) -> Result<&[Chunk]> {
        level_for_bin(bin)?;
        Ok(self
            .references
            .get(reference)
            .and_then(|r| r.bins.get(&bin))
            .map(Bin::chunks)
            .unwrap_or_default())
    }

    /// Check every indexed sequence name against an authoritative dictionary
    pub fn validate_against(
        &self,
        dictionary: &SequenceDictionary,
        validation: DictionaryValidation,
        path: &Path,
    ) -> Result<()> {
        for name in &self.sequence_names {
            if dictionary.contains(name) {
                continue;
            }
            match validation {
                DictionaryValidation::Strict => {
                    return Err(SpanError::SequenceNotInDictionary {
                        name: name.clone(),
                        path: path.to_path_buf(),
                    });
                }
                DictionaryValidation::AllowMissingSequences => {
                    warn!(
                        "Sequence '{}' in index of {:?} is missing from the dictionary; continuing because missing sequences are allowed",
                        name, path
                    );
                }
            }
        }
        Ok(())
    }
}
