//! BGZF block header and block codec

use super::{EOF_BLOCK, MAX_BLOCK_SIZE, MAX_PAYLOAD_SIZE};
use crate::{Result, SpanError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// gzip ID1, ID2, CM (deflate), FLG (FEXTRA)
const GZIP_MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x04];

/// Block header
///
/// ```text
/// ID1 ID2 CM FLG | MTIME(4) | XFL OS | XLEN(2)=6 | 'B' 'C' | SLEN(2)=2 | BSIZE(2)
/// ```
///
/// `BSIZE` is the total block length minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total compressed block length, header and footer included
    pub block_size: usize,
}

impl BlockHeader {
    /// Header size in bytes
    pub const SIZE: usize = 18;

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&GZIP_MAGIC);
        buf.put_u32_le(0); // MTIME
        buf.put_u8(0); // XFL
        buf.put_u8(0xff); // OS unknown
        buf.put_u16_le(6); // XLEN
        buf.put_u8(b'B');
        buf.put_u8(b'C');
        buf.put_u16_le(2); // SLEN
        buf.put_u16_le((self.block_size - 1) as u16);
        buf.freeze()
    }

    /// Deserialize from bytes, checking the signature before the length field
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(SpanError::Truncated(format!(
                "block header has {} of {} bytes",
                data.len(),
                Self::SIZE
            )));
        }
        if !has_signature(data) {
            return Err(SpanError::InvalidFormat(
                "block does not start with the BGZF signature".into(),
            ));
        }

        let mut cursor = std::io::Cursor::new(&data[16..Self::SIZE]);
        let block_size = cursor.get_u16_le() as usize + 1;
        if block_size < Self::SIZE + Footer::SIZE || block_size > MAX_BLOCK_SIZE {
            return Err(SpanError::InvalidFormat(format!(
                "block size {} outside [{}, {}]",
                block_size,
                Self::SIZE + Footer::SIZE,
                MAX_BLOCK_SIZE
            )));
        }

        Ok(Self { block_size })
    }
}

/// Check the fixed signature bytes of a block header.
pub(crate) fn has_signature(data: &[u8]) -> bool {
    data.len() >= BlockHeader::SIZE
        && data[..4] == GZIP_MAGIC
        && data[10..12] == [6, 0]
        && data[12..14] == *b"BC"
        && data[14..16] == [2, 0]
}

/// Trailing CRC32 and decompressed length
#[derive(Debug, Clone, Copy)]
struct Footer {
    crc32: u32,
    uncompressed_size: u32,
}

impl Footer {
    const SIZE: usize = 8;

    fn from_bytes(data: &[u8]) -> Self {
        let mut cursor = std::io::Cursor::new(data);
        Self {
            crc32: cursor.get_u32_le(),
            uncompressed_size: cursor.get_u32_le(),
        }
    }
}

/// Compress one payload into a complete block.
///
/// Falls back to stored deflate output when the compressed form would not
/// fit within the block size limit.
pub fn encode_block(payload: &[u8], level: Compression) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(SpanError::Internal(format!(
            "block payload of {} bytes exceeds {}",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut cdata = deflate(payload, level)?;
    if BlockHeader::SIZE + cdata.len() + Footer::SIZE > MAX_BLOCK_SIZE {
        cdata = deflate(payload, Compression::none())?;
    }
    let block_size = BlockHeader::SIZE + cdata.len() + Footer::SIZE;
    if block_size > MAX_BLOCK_SIZE {
        return Err(SpanError::Compression(format!(
            "compressed block of {} bytes exceeds {}",
            block_size, MAX_BLOCK_SIZE
        )));
    }

    let mut buf = BytesMut::with_capacity(block_size);
    buf.put_slice(&BlockHeader { block_size }.to_bytes());
    buf.put_slice(&cdata);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_u32_le(payload.len() as u32);

    Ok(buf.freeze())
}

fn deflate(payload: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(payload.len() / 2), level);
    encoder
        .write_all(payload)
        .map_err(|e| SpanError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| SpanError::Compression(e.to_string()))
}

/// Decompress a complete block into `out`, replacing its contents.
///
/// Verifies the decompressed length and CRC32 recorded in the footer.
pub fn decode_block_into(raw: &[u8], out: &mut Vec<u8>) -> Result<BlockHeader> {
    let header = BlockHeader::from_bytes(raw)?;
    if raw.len() < header.block_size {
        return Err(SpanError::Truncated(format!(
            "block body has {} of {} bytes",
            raw.len(),
            header.block_size
        )));
    }

    let footer_pos = header.block_size - Footer::SIZE;
    let footer = Footer::from_bytes(&raw[footer_pos..header.block_size]);
    let expected_len = footer.uncompressed_size as usize;
    if expected_len > MAX_BLOCK_SIZE {
        return Err(SpanError::InvalidFormat(format!(
            "decompressed size {} exceeds {}",
            expected_len, MAX_BLOCK_SIZE
        )));
    }

    out.clear();
    out.reserve(expected_len);
    // one byte past the recorded size is enough to detect a mismatch
    DeflateDecoder::new(&raw[BlockHeader::SIZE..footer_pos])
        .take(expected_len as u64 + 1)
        .read_to_end(out)
        .map_err(|e| SpanError::Compression(e.to_string()))?;

    if out.len() != expected_len {
        return Err(SpanError::InvalidFormat(format!(
            "decompressed {} bytes, footer records {}",
            out.len(),
            expected_len
        )));
    }

    let actual = crc32fast::hash(out);
    if actual != footer.crc32 {
        return Err(SpanError::ChecksumMismatch {
            expected: footer.crc32,
            actual,
        });
    }

    Ok(header)
}

/// Decompress a complete block.
pub fn decode_block(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode_block_into(raw, &mut out)?;
    Ok(out)
}

/// Check whether `raw` is exactly the end-of-stream marker block.
pub fn is_eof_block(raw: &[u8]) -> bool {
    raw == EOF_BLOCK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = BlockHeader { block_size: 1234 };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), BlockHeader::SIZE);
        assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_bad_signature() {
        let mut bytes = BlockHeader { block_size: 100 }.to_bytes().to_vec();
        bytes[12] = b'X';
        let err = BlockHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.is_format_error());

        let err = BlockHeader::from_bytes(&bytes[..10]).unwrap_err();
        assert!(matches!(err, SpanError::Truncated(_)));
    }

    #[test]
    fn test_header_rejects_undersized_block() {
        let mut bytes = BlockHeader { block_size: 100 }.to_bytes().to_vec();
        bytes[16] = 3;
        bytes[17] = 0;
        assert!(BlockHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_block_codec() {
        let payload: Vec<u8> = (0..5000u32).flat_map(|i| i.to_le_bytes()).take(20000).collect();
        let block = encode_block(&payload, Compression::default()).unwrap();
        assert!(block.len() <= MAX_BLOCK_SIZE);

        let decoded = decode_block(&block).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_incompressible_payload_fits() {
        let mut state = 0x2545_f491_u32;
        let payload: Vec<u8> = (0..MAX_PAYLOAD_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let block = encode_block(&payload, Compression::best()).unwrap();
        assert!(block.len() <= MAX_BLOCK_SIZE);
        assert_eq!(decode_block(&block).unwrap(), payload);
    }

    #[test]
    fn test_empty_payload_decodes_empty() {
        let block = encode_block(&[], Compression::default()).unwrap();
        assert!(decode_block(&block).unwrap().is_empty());
        assert!(decode_block(&EOF_BLOCK).unwrap().is_empty());
        assert!(is_eof_block(&EOF_BLOCK));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let block = encode_block(b"hello block", Compression::default()).unwrap();
        let mut corrupt = block.to_vec();
        let crc_pos = corrupt.len() - 8;
        corrupt[crc_pos] ^= 0xff;

        let err = decode_block(&corrupt).unwrap_err();
        assert!(matches!(err, SpanError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_inflation_stops_past_recorded_size() {
        // ~10 MB of zeros deflates to a few KB, well inside one block
        let cdata = deflate(&vec![0u8; 10 << 20], Compression::best()).unwrap();
        let block_size = BlockHeader::SIZE + cdata.len() + Footer::SIZE;
        assert!(block_size <= MAX_BLOCK_SIZE);

        let mut buf = BytesMut::with_capacity(block_size);
        buf.put_slice(&BlockHeader { block_size }.to_bytes());
        buf.put_slice(&cdata);
        buf.put_u32_le(0);
        buf.put_u32_le(100);

        let mut out = Vec::new();
        let err = decode_block_into(&buf, &mut out).unwrap_err();
        assert!(matches!(err, SpanError::InvalidFormat(_)));
        assert_eq!(out.len(), 101);
    }

    #[test]
    fn test_truncated_body_detected() {
        let block = encode_block(b"hello block", Compression::default()).unwrap();
        let err = decode_block(&block[..block.len() - 3]).unwrap_err();
        assert!(matches!(err, SpanError::Truncated(_)));
    }
}
