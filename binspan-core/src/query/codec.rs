//! Record decoding seam and the built-in feature codec

use crate::types::Locus;
use crate::{Result, SpanError};
use serde::Serialize;
use std::io::BufRead;

/// Decodes domain records from a decompressed stream
///
/// The indexer and the query iterator call `decode` repeatedly on a reader
/// positioned at a record boundary. A codec must consume exactly one record
/// per call so that the reader's virtual position afterwards is the start of
/// the next record.
pub trait RecordCodec {
    type Record;

    /// Decode the next record, or `None` at end of stream
    fn decode<R: BufRead>(&self, reader: &mut R) -> Result<Option<Self::Record>>;

    /// Coordinates of a record; `None` for unplaced records
    fn locus(&self, record: &Self::Record) -> Option<Locus>;
}

/// One line of a tab-delimited feature file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    /// The line without its terminator
    pub line: String,
    /// Parsed coordinates; `None` for `#` header lines
    pub locus: Option<Locus>,
}

impl Feature {
    /// Columns after `name`, `start` and `end`
    pub fn extra_fields(&self) -> impl Iterator<Item = &str> {
        self.line.split('\t').skip(if self.locus.is_some() { 3 } else { 0 })
    }

    pub fn is_header(&self) -> bool {
        self.locus.is_none()
    }
}

/// Codec for `name<TAB>start<TAB>end[<TAB>...]` lines, 0-based half-open.
///
/// Lines starting with `#` are headers and carry no coordinates. Blank lines
/// are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureCodec;

impl FeatureCodec {
    fn parse(line: String) -> Result<Feature> {
        if line.starts_with('#') {
            return Ok(Feature { line, locus: None });
        }

        let mut fields = line.split('\t');
        let (Some(name), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(SpanError::InvalidFormat(format!(
                "feature line needs name, start and end columns: '{}'",
                line
            )));
        };
        let start = parse_coordinate(start, &line)?;
        let end = parse_coordinate(end, &line)?;
        let locus = Locus::new(name, start, end)?;
        Ok(Feature {
            line,
            locus: Some(locus),
        })
    }
}

fn parse_coordinate(field: &str, line: &str) -> Result<u64> {
    field.trim().parse().map_err(|_| {
        SpanError::InvalidFormat(format!("bad coordinate '{}' in line '{}'", field, line))
    })
}

impl RecordCodec for FeatureCodec {
    type Record = Feature;

    fn decode<R: BufRead>(&self, reader: &mut R) -> Result<Option<Feature>> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\n', '\r']).len();
            line.truncate(trimmed);
            if !line.is_empty() {
                return Self::parse(line).map(Some);
            }
        }
    }

    fn locus(&self, record: &Feature) -> Option<Locus> {
        record.locus.clone()
    }
}
