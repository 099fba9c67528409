//! BGZF reader with virtual-offset seeking

use super::block::decode_block_into;
use super::{BlockHeader, VirtualOffset};
use crate::{Result, SpanError};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

/// Reader over a BGZF container
///
/// Exactly one decompressed block is resident at a time; the next block is
/// read lazily once the current one is exhausted.
pub struct BgzfReader<R> {
    inner: R,
    /// Decompressed payload of the resident block
    block: Vec<u8>,
    /// Raw bytes of the last block read, reused between blocks
    scratch: Vec<u8>,
    /// Compressed offset of the resident block
    block_offset: u64,
    /// Compressed offset of the block after the resident one
    next_block_offset: u64,
    /// Read position within `block`
    cursor: usize,
}

impl BgzfReader<BufReader<File>> {
    /// Open a container file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Wrap a stream positioned at the start of a container
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block: Vec::new(),
            scratch: Vec::new(),
            block_offset: 0,
            next_block_offset: 0,
            cursor: 0,
        }
    }

    /// Virtual offset of the next byte `read` will return.
    ///
    /// Once the resident block is fully consumed this reports the start of
    /// the following block, so seeking to it resumes at the next byte.
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.cursor >= self.block.len() {
            VirtualOffset::new(self.next_block_offset, 0)
        } else {
            VirtualOffset::new(self.block_offset, self.cursor as u16)
        }
    }

    /// Position the reader at a virtual offset.
    ///
    /// Decompresses the addressed block and fails if the offset within it is
    /// not smaller than the block's decompressed length. Offset 0 of an empty
    /// block moves on to the next non-empty block.
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        let block_offset = offset.compressed_offset();
        let intra = offset.uncompressed_offset() as usize;

        let resident = block_offset == self.block_offset
            && self.next_block_offset > self.block_offset
            && !self.block.is_empty();
        if !resident {
            self.inner.seek(SeekFrom::Start(block_offset))?;
            self.next_block_offset = block_offset;
            self.block.clear();
            self.cursor = 0;
            if !self.read_block()? {
                return Err(SpanError::OffsetOutOfBlock {
                    offset,
                    block_len: 0,
                });
            }
            // the start of an empty block addresses the next byte after it,
            // as reported by `virtual_position` across concatenated containers
            while intra == 0 && self.block.is_empty() {
                if !self.read_block()? {
                    return Err(SpanError::OffsetOutOfBlock {
                        offset,
                        block_len: 0,
                    });
                }
            }
        }

        if intra >= self.block.len() {
            self.cursor = self.block.len();
            return Err(SpanError::OffsetOutOfBlock {
                offset,
                block_len: self.block.len(),
            });
        }
        self.cursor = intra;
        trace!("seeked to {}", offset);
        Ok(())
    }

    /// Read the block at `next_block_offset`.
    ///
    /// Returns `false` on a clean end of stream (no bytes left at a block
    /// boundary).
    fn read_block(&mut self) -> Result<bool> {
        let mut header = [0u8; BlockHeader::SIZE];
        let filled = read_up_to(&mut self.inner, &mut header)?;
        if filled == 0 {
            return Ok(false);
        }
        if filled < header.len() {
            return Err(SpanError::Truncated(format!(
                "block header at offset {} has {} of {} bytes",
                self.next_block_offset,
                filled,
                header.len()
            )));
        }

        let parsed = BlockHeader::from_bytes(&header).map_err(|e| match e {
            SpanError::InvalidFormat(msg) => {
                SpanError::InvalidFormat(format!("{} at offset {}", msg, self.next_block_offset))
            }
            other => other,
        })?;

        self.scratch.clear();
        self.scratch.extend_from_slice(&header);
        self.scratch.resize(parsed.block_size, 0);
        self.inner
            .read_exact(&mut self.scratch[BlockHeader::SIZE..])
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => SpanError::Truncated(format!(
                    "block at offset {} ends before its recorded size {}",
                    self.next_block_offset, parsed.block_size
                )),
                _ => SpanError::from(e),
            })?;

        if let Err(e) = decode_block_into(&self.scratch, &mut self.block) {
            self.block.clear();
            self.cursor = 0;
            return Err(e);
        }
        self.block_offset = self.next_block_offset;
        self.next_block_offset += parsed.block_size as u64;
        self.cursor = 0;
        Ok(true)
    }

    /// Make sure unread bytes are resident, skipping empty blocks.
    ///
    /// Returns `false` at end of stream.
    fn ensure_block(&mut self) -> Result<bool> {
        while self.cursor >= self.block.len() {
            if !self.read_block()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Compressed offset of the resident block
    pub fn block_offset(&self) -> u64 {
        self.block_offset
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read + Seek> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read + Seek> BufRead for BgzfReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if !self.ensure_block()? {
            return Ok(&[]);
        }
        Ok(&self.block[self.cursor..])
    }

    fn consume(&mut self, amt: usize) {
        self.cursor = (self.cursor + amt).min(self.block.len());
    }
}
