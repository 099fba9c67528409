//! Single-pass index construction

use super::bin::Bin;
use super::binning::bin_for_interval;
use super::linear::LinearIndexBuilder;
use super::sidecar::MAX_NAME_LEN;
use super::{BinIndex, ReferenceIndex};
use crate::bgzf::BgzfReader;
use crate::chunk::Chunk;
use crate::query::RecordCodec;
use crate::types::Locus;
use crate::{Result, SpanError};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-sequence state while building
#[derive(Default)]
struct ReferenceBuilder {
    bins: BTreeMap<u32, Bin>,
    linear: LinearIndexBuilder,
}

/// Accumulates records in source order into a [`BinIndex`]
///
/// Records must arrive sorted by start within each sequence, and every
/// sequence must appear in one contiguous run.
pub struct BinIndexBuilder {
    path: PathBuf,
    sequence_names: Vec<String>,
    name_to_ref: HashMap<String, usize>,
    references: Vec<ReferenceBuilder>,
    /// Reference id and start of the last placed record
    last: Option<(usize, u64)>,
    placed: u64,
    unplaced: u64,
}

impl BinIndexBuilder {
    /// Start an index for the source at `path` (used in error messages)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequence_names: Vec::new(),
            name_to_ref: HashMap::new(),
            references: Vec::new(),
            last: None,
            placed: 0,
            unplaced: 0,
        }
    }

    /// Scan a BGZF source once through `codec` and build its index
    pub fn from_source<C: RecordCodec>(path: &Path, codec: &C) -> Result<BinIndex> {
        let file = File::open(path).map_err(|source| SpanError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BgzfReader::new(BufReader::new(file));
        let mut builder = Self::new(path);

        loop {
            let before = reader.virtual_position();
            let Some(record) = codec.decode(&mut reader)? else {
                break;
            };
            let after = reader.virtual_position();
            let locus = codec.locus(&record);
            builder.add_record(locus.as_ref(), Chunk::new(before, after))?;
        }

        info!(
            "Indexed {:?}: {} placed records, {} unplaced, {} sequences",
            path,
            builder.placed,
            builder.unplaced,
            builder.sequence_names.len()
        );
        Ok(builder.build())
    }

    /// Record one decoded record occupying `chunk`; `None` marks it unplaced
    pub fn add_record(&mut self, locus: Option<&Locus>, chunk: Chunk) -> Result<()> {
        let Some(locus) = locus else {
            self.unplaced += 1;
            return Ok(());
        };

        let reference = self.reference_for(locus)?;
        let bin_number = bin_for_interval(locus.start, locus.end)?;

        let state = &mut self.references[reference];
        state
            .bins
            .entry(bin_number)
            .or_insert_with(|| Bin::new(reference, bin_number))
            .add_chunk(chunk);
        state.linear.record(locus.start, locus.end, chunk.start());

        self.last = Some((reference, locus.start));
        self.placed += 1;
        Ok(())
    }

    /// Resolve the reference id for a record, enforcing sort order
    fn reference_for(&mut self, locus: &Locus) -> Result<usize> {
        match (self.name_to_ref.get(&locus.sequence).copied(), self.last) {
            (Some(id), Some((last_id, last_start))) if id == last_id => {
                if locus.start < last_start {
                    return Err(self.unsorted(format!(
                        "record at {} starts before previous start {}",
                        locus, last_start
                    )));
                }
                Ok(id)
            }
            (Some(_), _) => Err(self.unsorted(format!(
                "record at {} reopens sequence '{}' after another sequence",
                locus, locus.sequence
            ))),
            (None, _) => {
                if locus.sequence.len() > MAX_NAME_LEN {
                    return Err(SpanError::InvalidFormat(format!(
                        "{:?}: sequence name of {} bytes exceeds the index limit of {}",
                        self.path,
                        locus.sequence.len(),
                        MAX_NAME_LEN
                    )));
                }
                let id = self.sequence_names.len();
                debug!("New sequence '{}' as reference {}", locus.sequence, id);
                self.sequence_names.push(locus.sequence.clone());
                self.name_to_ref.insert(locus.sequence.clone(), id);
                self.references.push(ReferenceBuilder::default());
                Ok(id)
            }
        }
    }

    fn unsorted(&self, detail: String) -> SpanError {
        SpanError::UnsortedSource {
            path: self.path.clone(),
            detail,
        }
    }

    /// Freeze the accumulated state
    pub fn build(self) -> BinIndex {
        let references = self
            .references
            .into_iter()
            .map(|r| ReferenceIndex::new(r.bins, r.linear.build()))
            .collect();
        BinIndex {
            sequence_names: self.sequence_names,
            name_to_ref: self.name_to_ref,
            references,
            unplaced_count: self.unplaced,
        }
    }
}
