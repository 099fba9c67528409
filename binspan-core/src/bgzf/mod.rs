//! BGZF block-compressed container
//!
//! A container is a concatenation of independently decompressible gzip
//! members ("blocks"). Each block records its own compressed length in a
//! header extra field, so a reader can hop from block to block without
//! inflating anything, and a [`VirtualOffset`] can address any byte of the
//! decompressed stream:
//!
//! ```text
//! [header 18B][raw deflate][crc32 4B][isize 4B] [header]... [EOF block 28B]
//! ```
//!
//! Readers keep a single decompressed block resident.

mod block;
mod reader;
mod virtual_offset;
mod writer;

pub use block::{decode_block, decode_block_into, encode_block, is_eof_block, BlockHeader};
pub use reader::BgzfReader;
pub use virtual_offset::{VirtualOffset, MAX_COMPRESSED_OFFSET};
pub use writer::{BgzfWriter, WriterConfig};

use crate::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Maximum total size of one block, header and footer included (64 KiB)
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Largest payload the writer places in one block
///
/// Leaves room for stored-deflate overhead so any payload fits a block.
pub const MAX_PAYLOAD_SIZE: usize = 0xff00;

/// The empty block that terminates every well-formed container
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Deflate level used when none is configured
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Check whether a stream starts with a BGZF block header.
///
/// The stream position is restored afterwards, so callers can sniff a file
/// before committing to a reader.
pub fn is_valid_container<R: Read + Seek>(stream: &mut R) -> Result<bool> {
    let start = stream.stream_position()?;
    let mut header = [0u8; BlockHeader::SIZE];
    let mut filled = 0;
    let outcome = loop {
        match stream.read(&mut header[filled..]) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                filled += n;
                if filled == header.len() {
                    break Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        }
    };
    stream.seek(SeekFrom::Start(start))?;
    outcome?;

    Ok(filled == header.len() && BlockHeader::from_bytes(&header).is_ok())
}

/// Check whether the file at `path` is a BGZF container.
pub fn is_valid_container_path(path: impl AsRef<Path>) -> Result<bool> {
    let mut file = File::open(path)?;
    is_valid_container(&mut file)
}
