//! Chunk algebra over virtual-offset ranges
//!
//! A [`Chunk`] is a half-open range of virtual offsets covering a run of
//! records. A [`FileSpan`] is a normalized set of chunks: sorted by start,
//! pairwise non-overlapping and non-adjacent, with no empty chunks. All span
//! operations are pure and return new spans.

mod chunk;
mod span;

pub use chunk::{Chunk, AVERAGE_COMPRESSION_RATIO};
pub use span::FileSpan;
