//! binspan core - indexed random access into block-compressed genomic data
//!
//! Provides the storage layer a genomics toolkit needs to pull the records
//! overlapping an interval out of a large compressed file:
//!
//! - **BGZF codec**: seekable block compression addressed by virtual offsets
//! - **Chunk algebra**: normalized sets of virtual-offset ranges
//! - **Bin index**: hierarchical bins plus a linear index per sequence
//! - **Index store**: side-car persistence guarded by advisory file locks,
//!   with an in-memory fallback when the lock or disk is unavailable
//! - **Range queries**: lazy, codec-driven record iteration over an interval
//!
//! # Example
//!
//! ```no_run
//! use binspan_core::query::{FeatureCodec, RangeQuery};
//! use binspan_core::store::{IndexStore, IndexStoreConfig};
//!
//! # fn main() -> binspan_core::Result<()> {
//! let store = IndexStore::new(IndexStoreConfig::default());
//! let mut query = RangeQuery::open(&store, "genes.bed.bgz", FeatureCodec)?;
//! for feature in query.query("chr1", 10_000, 20_000)? {
//!     println!("{}", feature?.line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bgzf;
pub mod chunk;
pub mod index;
pub mod query;
pub mod store;

mod error;
mod types;

pub use error::{Result, SpanError};
pub use types::*;

/// binspan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Side-car index extension appended to the source file name
    pub const INDEX_EXTENSION: &str = "bsi";

    /// Lock file extension appended to the side-car name
    pub const LOCK_EXTENSION: &str = "lock";

    /// Longest wait for a side-car lock (10s)
    pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;

    /// Delay between lock attempts
    pub const DEFAULT_LOCK_POLL_MS: u64 = 25;
}
