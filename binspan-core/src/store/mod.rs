//! Side-car index lifecycle
//!
//! An [`IndexStore`] loads the index of a source file from `<source>.bsi`,
//! rebuilding and persisting it when it is missing, stale or corrupt.
//! Concurrent processes coordinate through advisory locks on
//! `<source>.bsi.lock`: readers take a shared lock, the writer an exclusive
//! one, and a lock that cannot be had within the timeout means working from
//! an in-memory index instead of waiting.

mod index_store;
mod lock;

pub use index_store::{IndexStore, StoreStats};

use crate::types::DictionaryValidation;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Index store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStoreConfig {
    /// Longest wait for a side-car lock before falling back to memory
    #[serde(rename = "lock_timeout_ms", with = "duration_ms")]
    pub lock_timeout: Duration,
    /// Delay between lock attempts
    #[serde(rename = "lock_poll_interval_ms", with = "duration_ms")]
    pub lock_poll_interval: Duration,
    /// Never lock, write or delete side-car files
    pub disable_auto_index_creation: bool,
    /// Strictness of the dictionary check on load
    pub validation: DictionaryValidation,
}

impl Default for IndexStoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(crate::config::DEFAULT_LOCK_TIMEOUT_MS),
            lock_poll_interval: Duration::from_millis(crate::config::DEFAULT_LOCK_POLL_MS),
            disable_auto_index_creation: false,
            validation: DictionaryValidation::Strict,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
