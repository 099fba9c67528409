//! Core types for binspan

use crate::index::MAX_COORDINATE;
use crate::{Result, SpanError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A genomic interval on a named sequence, 0-based half-open
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Locus {
    /// Sequence (contig) name
    pub sequence: String,
    /// First covered position
    pub start: u64,
    /// One past the last covered position
    pub end: u64,
}

impl Locus {
    /// Create a locus, checking that it lies in the indexable range
    pub fn new(sequence: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        check_interval(start, end)?;
        Ok(Self {
            sequence: sequence.into(),
            start,
            end,
        })
    }

    /// Number of positions covered
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether this locus shares a position with `[start, end)` on `sequence`.
    ///
    /// A zero-length locus counts as overlapping when it sits strictly inside
    /// the interval or at its start.
    pub fn overlaps(&self, sequence: &str, start: u64, end: u64) -> bool {
        if self.sequence != sequence || start >= end {
            return false;
        }
        if self.is_empty() {
            return start <= self.start && self.start < end;
        }
        self.start < end && start < self.end
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.sequence, self.start, self.end)
    }
}

/// Validate a 0-based half-open interval against the binning range
pub fn check_interval(start: u64, end: u64) -> Result<()> {
    if start > end || end > MAX_COORDINATE {
        return Err(SpanError::InvalidInterval { start, end });
    }
    Ok(())
}

/// One entry of a sequence dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub name: String,
    pub length: u64,
}

/// How strictly an index is checked against a sequence dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryValidation {
    /// Any sequence missing from the dictionary fails validation
    #[default]
    Strict,
    /// Missing sequences are logged and tolerated
    AllowMissingSequences,
}

/// Authoritative, ordered mapping of sequence names to lengths
#[derive(Debug, Clone, Default)]
pub struct SequenceDictionary {
    sequences: Vec<SequenceRecord>,
    by_name: HashMap<String, usize>,
}

impl SequenceDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sequence; duplicate names are rejected
    pub fn push(&mut self, name: impl Into<String>, length: u64) -> Result<()> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SpanError::Config(format!(
                "sequence '{}' listed twice in dictionary",
                name
            )));
        }
        self.by_name.insert(name.clone(), self.sequences.len());
        self.sequences.push(SequenceRecord { name, length });
        Ok(())
    }

    /// Parse `name<TAB>length[<TAB>...]` lines.
    ///
    /// Extra columns are ignored, so a `.fai` file can be read directly.
    /// Blank lines and `#` comments are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut dict = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default();
            let length = fields.next().ok_or_else(|| {
                SpanError::Config(format!(
                    "dictionary line {} has no length column",
                    line_no + 1
                ))
            })?;
            let length = length.trim().parse::<u64>().map_err(|e| {
                SpanError::Config(format!(
                    "dictionary line {}: bad length '{}': {}",
                    line_no + 1,
                    length,
                    e
                ))
            })?;
            dict.push(name, length)?;
        }
        Ok(dict)
    }

    /// Read a dictionary file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SpanError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn get(&self, name: &str) -> Option<&SequenceRecord> {
        self.by_name.get(name).map(|&i| &self.sequences[i])
    }

    /// Position of `name` in dictionary order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceRecord> {
        self.sequences.iter()
    }
}
