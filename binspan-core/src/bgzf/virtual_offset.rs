//! Virtual file offsets

use std::fmt;

/// Largest compressed offset representable in the upper 48 bits.
pub const MAX_COMPRESSED_OFFSET: u64 = (1 << 48) - 1;

/// Virtual file offset into a block-compressed container.
///
/// - Bits 63-16: offset of the compressed block within the file
/// - Bits 15-0: offset within that block's decompressed payload
///
/// The raw `u64` order is the positional order: block offset first, then
/// offset within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Create a virtual offset from its two components.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        debug_assert!(compressed <= MAX_COMPRESSED_OFFSET);
        VirtualOffset((compressed << 16) | u64::from(uncompressed))
    }

    /// Create from a raw 64-bit value.
    pub fn from_raw(value: u64) -> Self {
        VirtualOffset(value)
    }

    /// Raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Offset of the compressed block (high 48 bits).
    pub fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block (low 16 bits).
    pub fn uncompressed_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        VirtualOffset::from_raw(value)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.as_raw()
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed_offset(), self.uncompressed_offset())
    }
}
