//! Range queries over indexed sources
//!
//! [`RangeQuery`] ties an [`IndexStore`](crate::store::IndexStore), a BGZF
//! reader and a [`RecordCodec`] together: an interval is mapped to a
//! [`FileSpan`](crate::chunk::FileSpan), and the records in that span are
//! decoded lazily and filtered to those overlapping the interval.

mod codec;
mod range;

pub use codec::{Feature, FeatureCodec, RecordCodec};
pub use range::{RangeQuery, Records};
