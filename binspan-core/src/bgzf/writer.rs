//! BGZF writer

use super::block::encode_block;
use super::{VirtualOffset, DEFAULT_COMPRESSION_LEVEL, EOF_BLOCK, MAX_PAYLOAD_SIZE};
use crate::{Result, SpanError};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// Writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Deflate level, 0 (stored) to 9 (best)
    pub compression_level: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Writer producing a BGZF container
///
/// Bytes accumulate until a block payload is full, then the block is
/// compressed and written. [`BgzfWriter::finish`] writes the pending block
/// and the end-of-stream marker.
pub struct BgzfWriter<W: Write> {
    inner: Option<W>,
    buffer: Vec<u8>,
    /// Compressed offset at which the pending block will be written
    compressed_offset: u64,
    level: Compression,
}

impl BgzfWriter<BufWriter<File>> {
    /// Create (or truncate) a container file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, WriterConfig::default())
    }

    /// Create a container file with explicit settings
    pub fn create_with_config(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_config(BufWriter::new(file), config))
    }
}

impl<W: Write> BgzfWriter<W> {
    /// Wrap a sink with default settings
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    /// Wrap a sink
    pub fn with_config(inner: W, config: WriterConfig) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::with_capacity(MAX_PAYLOAD_SIZE),
            compressed_offset: 0,
            level: Compression::new(config.compression_level.min(9)),
        }
    }

    /// Virtual offset at which the next written byte will be readable
    pub fn virtual_position(&self) -> VirtualOffset {
        VirtualOffset::new(self.compressed_offset, self.buffer.len() as u16)
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let block = encode_block(&self.buffer, self.level)?;
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| SpanError::Internal("write after finish".into()))?;
        inner.write_all(&block)?;
        self.compressed_offset += block.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn finish_in_place(&mut self) -> Result<()> {
        self.flush_block()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.write_all(&EOF_BLOCK)?;
            inner.flush()?;
            self.compressed_offset += EOF_BLOCK.len() as u64;
        }
        Ok(())
    }

    /// Write the pending block and the end-of-stream marker, returning the sink
    pub fn finish(mut self) -> Result<W> {
        self.finish_in_place()?;
        self.inner
            .take()
            .ok_or_else(|| SpanError::Internal("writer already finished".into()))
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = MAX_PAYLOAD_SIZE - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == MAX_PAYLOAD_SIZE {
            self.flush_block()?;
        }
        Ok(n)
    }

    /// Ends the current block early; the next byte starts a new block.
    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish_in_place() {
                warn!("Failed to finish BGZF stream on drop: {}", e);
            }
        }
    }
}
