//! Hierarchical binning over a 2^29 coordinate space
//!
//! Six levels, each bin splitting into eight children:
//!
//! | level | bins          | bin width |
//! |-------|---------------|-----------|
//! | 0     | 0             | 512 Mbp   |
//! | 1     | 1-8           | 64 Mbp    |
//! | 2     | 9-72          | 8 Mbp     |
//! | 3     | 73-584        | 1 Mbp     |
//! | 4     | 585-4680      | 128 Kbp   |
//! | 5     | 4681-37448    | 16 Kbp    |
//!
//! Coordinates are 0-based half-open.

use crate::types::check_interval;
use crate::{Result, SpanError};

/// Exclusive upper bound of indexable coordinates
pub const MAX_COORDINATE: u64 = 1 << 29;

/// Number of valid bin numbers (`0..MAX_BINS`)
pub const MAX_BINS: u32 = 37449;

/// Deepest level
pub const MAX_LEVEL: u32 = 5;

/// First bin number of each level
pub const LEVEL_STARTS: [u32; 6] = [0, 1, 9, 73, 585, 4681];

/// Width shift of the finest bins (16 Kbp)
pub const MIN_SHIFT: u32 = 14;

fn shift_for_level(level: u32) -> u32 {
    MIN_SHIFT + 3 * (MAX_LEVEL - level)
}

/// Smallest bin fully containing `[start, end)`.
///
/// A zero-length interval is binned as the single position at `start`.
pub fn bin_for_interval(start: u64, end: u64) -> Result<u32> {
    check_interval(start, end)?;
    if start >= MAX_COORDINATE {
        return Err(SpanError::InvalidInterval { start, end });
    }
    let last = end.max(start + 1) - 1;

    for level in (1..=MAX_LEVEL).rev() {
        let shift = shift_for_level(level);
        if start >> shift == last >> shift {
            return Ok(LEVEL_STARTS[level as usize] + (start >> shift) as u32);
        }
    }
    Ok(0)
}

/// Every bin whose range overlaps `[start, end)`, coarsest level first.
///
/// An empty interval overlaps nothing.
pub fn bins_overlapping(start: u64, end: u64) -> Result<Vec<u32>> {
    check_interval(start, end)?;
    if start == end {
        return Ok(Vec::new());
    }
    let last = end - 1;

    let mut bins = vec![0];
    for level in 1..=MAX_LEVEL {
        let shift = shift_for_level(level);
        let offset = LEVEL_STARTS[level as usize];
        let first = offset + (start >> shift) as u32;
        let final_bin = offset + (last >> shift) as u32;
        bins.extend(first..=final_bin);
    }
    Ok(bins)
}

fn check_bin(bin: u32) -> Result<()> {
    if bin >= MAX_BINS {
        return Err(SpanError::Internal(format!(
            "bin number {} is outside 0..{}",
            bin, MAX_BINS
        )));
    }
    Ok(())
}

/// Level (0 = whole space, 5 = 16 Kbp) of a bin
pub fn level_for_bin(bin: u32) -> Result<u32> {
    check_bin(bin)?;
    let level = LEVEL_STARTS
        .iter()
        .rposition(|&first| first <= bin)
        .unwrap_or(0);
    Ok(level as u32)
}

/// First position covered by a bin
pub fn first_locus_in_bin(bin: u32) -> Result<u64> {
    let level = level_for_bin(bin)?;
    let index = u64::from(bin - LEVEL_STARTS[level as usize]);
    Ok(index << shift_for_level(level))
}

/// Last position (inclusive) covered by a bin
pub fn last_locus_in_bin(bin: u32) -> Result<u64> {
    let level = level_for_bin(bin)?;
    let width = 1u64 << shift_for_level(level);
    Ok(first_locus_in_bin(bin)? + width - 1)
}

/// Enclosing bin one level up; `None` for bin 0
pub fn parent_bin(bin: u32) -> Result<Option<u32>> {
    check_bin(bin)?;
    Ok(if bin == 0 { None } else { Some((bin - 1) >> 3) })
}
