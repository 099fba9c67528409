//! Interval queries over an indexed source

use super::RecordCodec;
use crate::bgzf::{BgzfReader, VirtualOffset};
use crate::chunk::{Chunk, FileSpan};
use crate::index::BinIndex;
use crate::store::IndexStore;
use crate::types::check_interval;
use crate::{Result, SpanError};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type SourceReader = BgzfReader<BufReader<File>>;

/// An open source file together with its index
pub struct RangeQuery<C: RecordCodec> {
    path: PathBuf,
    index: Arc<BinIndex>,
    codec: C,
    reader: SourceReader,
}

impl<C: RecordCodec> RangeQuery<C> {
    /// Load (or build) the index through `store` and open the source
    pub fn open(store: &IndexStore, source: impl AsRef<Path>, codec: C) -> Result<Self> {
        let path = source.as_ref().to_path_buf();
        let index = store.load_index(&path, &codec)?;
        let file = File::open(&path).map_err(|e| SpanError::SourceUnreadable {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self {
            path,
            index,
            codec,
            reader: BgzfReader::new(BufReader::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared index backing this query
    pub fn index(&self) -> &Arc<BinIndex> {
        &self.index
    }

    /// Chunks that may hold records overlapping `[start, end)` on `sequence`
    pub fn spans(&self, sequence: &str, start: u64, end: u64) -> Result<FileSpan> {
        let span = self.index.chunks_for_interval(sequence, start, end)?;
        span.check_invariants()?;
        debug!(
            "{}:{}-{} maps to {} chunks (~{} bytes)",
            sequence,
            start,
            end,
            span.len(),
            span.size()
        );
        Ok(span)
    }

    /// Records overlapping `[start, end)` on `sequence`, decoded lazily
    pub fn query(&mut self, sequence: &str, start: u64, end: u64) -> Result<Records<'_, C>> {
        check_interval(start, end)?;
        let span = self.spans(sequence, start, end)?;
        Ok(Records {
            reader: &mut self.reader,
            codec: &self.codec,
            chunks: span.into_iter(),
            chunk_end: None,
            sequence: sequence.to_string(),
            start,
            end,
            done: false,
        })
    }

    /// Release the source reader
    pub fn close(self) {
        debug!("Closing query over {:?}", self.path);
    }
}

/// Lazy iterator over the records of one query
///
/// Seeks to each chunk start on demand and decodes until the reader reaches
/// the chunk end. Stops after the first error.
pub struct Records<'a, C: RecordCodec> {
    reader: &'a mut SourceReader,
    codec: &'a C,
    chunks: std::vec::IntoIter<Chunk>,
    /// End of the chunk being read, `None` between chunks
    chunk_end: Option<VirtualOffset>,
    sequence: String,
    start: u64,
    end: u64,
    done: bool,
}

impl<C: RecordCodec> Records<'_, C> {
    fn next_record(&mut self) -> Result<Option<C::Record>> {
        loop {
            let chunk_end = match self.chunk_end {
                Some(end) => end,
                None => {
                    let Some(chunk) = self.chunks.next() else {
                        return Ok(None);
                    };
                    self.reader.seek(chunk.start())?;
                    self.chunk_end = Some(chunk.end());
                    chunk.end()
                }
            };

            if self.reader.virtual_position() >= chunk_end {
                self.chunk_end = None;
                continue;
            }

            let Some(record) = self.codec.decode(&mut *self.reader)? else {
                self.chunk_end = None;
                continue;
            };
            let overlaps = self
                .codec
                .locus(&record)
                .is_some_and(|l| l.overlaps(&self.sequence, self.start, self.end));
            if overlaps {
                return Ok(Some(record));
            }
        }
    }
}

impl<C: RecordCodec> Iterator for Records<'_, C> {
    type Item = Result<C::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
