//! On-disk encoding of a [`BinIndex`]
//!
//! Little-endian throughout:
//!
//! ```text
//! magic "BSPI" | version u32 | n_seq u32 | (len u16, name)* | n_unplaced u64
//! per reference: n_bin u32 | (bin u32, n_chunk u32, (start u64, end u64)*)*
//!                n_intv u32 | offset u64*
//! crc32 u32 over everything before it
//! ```

use super::bin::Bin;
use super::binning::MAX_BINS;
use super::linear::LinearIndex;
use super::{BinIndex, ReferenceIndex};
use crate::bgzf::VirtualOffset;
use crate::chunk::Chunk;
use crate::{Result, SpanError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Leading bytes of every side-car file
pub const SIDECAR_MAGIC: &[u8; 4] = b"BSPI";

/// Current side-car layout version
pub const FORMAT_VERSION: u32 = 1;

/// Longest sequence name the `u16` length prefix can carry
pub(crate) const MAX_NAME_LEN: usize = u16::MAX as usize;

const HEADER_SIZE: usize = 8;
const TRAILER_SIZE: usize = 4;

/// Result of decoding side-car bytes
#[derive(Debug)]
pub enum SidecarContents {
    /// A current-version index
    Index(BinIndex),
    /// Well-formed header carrying another version; the body is not inspected
    OtherVersion(u32),
}

/// Serialize an index with a trailing checksum
pub fn encode_sidecar(index: &BinIndex) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + index.chunk_count() * 16);
    buf.put_slice(SIDECAR_MAGIC);
    buf.put_u32_le(FORMAT_VERSION);

    buf.put_u32_le(index.sequence_names.len() as u32);
    for name in &index.sequence_names {
        buf.put_u16_le(name.len() as u16);
        buf.put_slice(name.as_bytes());
    }
    buf.put_u64_le(index.unplaced_count);

    for reference in &index.references {
        buf.put_u32_le(reference.bins.len() as u32);
        for bin in reference.bins.values() {
            buf.put_u32_le(bin.number());
            buf.put_u32_le(bin.chunks().len() as u32);
            for chunk in bin.chunks() {
                buf.put_u64_le(chunk.start().as_raw());
                buf.put_u64_le(chunk.end().as_raw());
            }
        }
        let offsets = reference.linear.offsets();
        buf.put_u32_le(offsets.len() as u32);
        for offset in offsets {
            buf.put_u64_le(offset.as_raw());
        }
    }

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    buf.freeze()
}

/// Parse side-car bytes.
///
/// A version other than [`FORMAT_VERSION`] is reported as
/// [`SidecarContents::OtherVersion`]; bad magic, checksum or truncation are
/// errors.
pub fn decode_sidecar(data: &[u8]) -> Result<SidecarContents> {
    if data.len() < HEADER_SIZE {
        return Err(SpanError::Truncated(format!(
            "index file has {} bytes, header needs {}",
            data.len(),
            HEADER_SIZE
        )));
    }
    if &data[..4] != SIDECAR_MAGIC {
        return Err(SpanError::InvalidFormat("Invalid index file magic".into()));
    }
    let version = (&data[4..8]).get_u32_le();
    if version != FORMAT_VERSION {
        return Ok(SidecarContents::OtherVersion(version));
    }

    if data.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(SpanError::Truncated("index file has no checksum".into()));
    }
    let (body, trailer) = data.split_at(data.len() - TRAILER_SIZE);
    let expected = (&trailer[..]).get_u32_le();
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(SpanError::ChecksumMismatch { expected, actual });
    }

    let mut cursor = &body[HEADER_SIZE..];
    let n_seq = take_u32(&mut cursor, "sequence count")? as usize;
    let mut names = Vec::with_capacity(n_seq.min(cursor.len()));
    for _ in 0..n_seq {
        let len = take_u16(&mut cursor, "name length")? as usize;
        ensure(&cursor, len, "sequence name")?;
        let name = std::str::from_utf8(&cursor[..len])
            .map_err(|e| SpanError::InvalidFormat(format!("sequence name is not UTF-8: {}", e)))?
            .to_string();
        cursor.advance(len);
        names.push(name);
    }
    let unplaced = take_u64(&mut cursor, "unplaced count")?;

    let mut references = Vec::with_capacity(names.len());
    for id in 0..names.len() {
        let n_bin = take_u32(&mut cursor, "bin count")?;
        let mut bins = BTreeMap::new();
        for _ in 0..n_bin {
            let number = take_u32(&mut cursor, "bin number")?;
            if number >= MAX_BINS {
                return Err(SpanError::InvalidFormat(format!(
                    "bin number {} out of range",
                    number
                )));
            }
            let n_chunk = take_u32(&mut cursor, "chunk count")? as usize;
            ensure(&cursor, n_chunk.saturating_mul(16), "chunks")?;
            let mut chunks = Vec::with_capacity(n_chunk);
            for _ in 0..n_chunk {
                let start = VirtualOffset::from_raw(cursor.get_u64_le());
                let end = VirtualOffset::from_raw(cursor.get_u64_le());
                chunks.push(Chunk::try_new(start, end)?);
            }
            if bins
                .insert(number, Bin::with_chunks(id, number, chunks))
                .is_some()
            {
                return Err(SpanError::InvalidFormat(format!(
                    "bin {} listed twice for reference {}",
                    number, id
                )));
            }
        }

        let n_intv = take_u32(&mut cursor, "linear index length")? as usize;
        ensure(&cursor, n_intv.saturating_mul(8), "linear index")?;
        let offsets = (0..n_intv)
            .map(|_| VirtualOffset::from_raw(cursor.get_u64_le()))
            .collect();
        references.push(ReferenceIndex::new(bins, LinearIndex::new(offsets)));
    }

    if cursor.has_remaining() {
        return Err(SpanError::InvalidFormat(format!(
            "{} unexpected bytes after index body",
            cursor.remaining()
        )));
    }

    BinIndex::from_parts(names, references, unplaced).map(SidecarContents::Index)
}

fn ensure(cursor: &[u8], needed: usize, what: &str) -> Result<()> {
    if cursor.remaining() < needed {
        return Err(SpanError::Truncated(format!(
            "index file ends inside {}",
            what
        )));
    }
    Ok(())
}

fn take_u16(cursor: &mut &[u8], what: &str) -> Result<u16> {
    ensure(cursor, 2, what)?;
    Ok(cursor.get_u16_le())
}

fn take_u32(cursor: &mut &[u8], what: &str) -> Result<u32> {
    ensure(cursor, 4, what)?;
    Ok(cursor.get_u32_le())
}

fn take_u64(cursor: &mut &[u8], what: &str) -> Result<u64> {
    ensure(cursor, 8, what)?;
    Ok(cursor.get_u64_le())
}
