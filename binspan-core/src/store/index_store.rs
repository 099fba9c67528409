//! Index store - loads, rebuilds and persists side-car indexes

use super::lock::{self, LockMode, LockOutcome};
use super::IndexStoreConfig;
use crate::index::{decode_sidecar, encode_sidecar, BinIndex, BinIndexBuilder, SidecarContents, FORMAT_VERSION};
use crate::query::RecordCodec;
use crate::types::SequenceDictionary;
use crate::{Result, SpanError};
use parking_lot::Mutex;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// What was found on disk for a source
enum DiskIndex {
    Fresh(BinIndex),
    Missing,
    Stale(String),
    Corrupt(SpanError),
    /// A writer held the lock past the timeout
    Locked,
}

/// Load counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub loaded_from_disk: u64,
    pub built_in_memory: u64,
    pub persisted: u64,
    pub lock_fallbacks: u64,
    pub stale_discarded: u64,
}

#[derive(Default)]
struct Counters {
    loaded_from_disk: AtomicU64,
    built_in_memory: AtomicU64,
    persisted: AtomicU64,
    lock_fallbacks: AtomicU64,
    stale_discarded: AtomicU64,
}

/// Loads and caches side-car indexes for source files
pub struct IndexStore {
    config: IndexStoreConfig,
    dictionary: Option<SequenceDictionary>,
    /// Serializes loads issued through this store
    load_lock: Mutex<()>,
    counters: Counters,
}

impl IndexStore {
    /// Create a store
    pub fn new(config: IndexStoreConfig) -> Self {
        Self {
            config,
            dictionary: None,
            load_lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Validate every loaded index against `dictionary`
    pub fn with_dictionary(mut self, dictionary: SequenceDictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn config(&self) -> &IndexStoreConfig {
        &self.config
    }

    /// Side-car path for a source: `<source>.bsi`
    pub fn index_path(source: &Path) -> PathBuf {
        with_suffix(source, crate::config::INDEX_EXTENSION)
    }

    /// Lock file guarding a source's side-car: `<source>.bsi.lock`
    pub fn lock_path(source: &Path) -> PathBuf {
        with_suffix(
            &Self::index_path(source),
            crate::config::LOCK_EXTENSION,
        )
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            loaded_from_disk: self.counters.loaded_from_disk.load(Ordering::Relaxed),
            built_in_memory: self.counters.built_in_memory.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            lock_fallbacks: self.counters.lock_fallbacks.load(Ordering::Relaxed),
            stale_discarded: self.counters.stale_discarded.load(Ordering::Relaxed),
        }
    }

    /// Load the index of `source`, building and persisting it as needed
    pub fn load_index<C: RecordCodec>(
        &self,
        source: impl AsRef<Path>,
        codec: &C,
    ) -> Result<Arc<BinIndex>> {
        let source = source.as_ref();
        let _serial = self.load_lock.lock();

        let source_mtime = File::open(source)
            .and_then(|f| f.metadata())
            .and_then(|m| m.modified())
            .map_err(|e| SpanError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })?;
        let index_path = Self::index_path(source);

        let index = match self.read_existing(source, &index_path, source_mtime) {
            DiskIndex::Fresh(index) => {
                self.counters.loaded_from_disk.fetch_add(1, Ordering::Relaxed);
                debug!("Loaded index {:?}", index_path);
                index
            }
            DiskIndex::Locked => {
                self.counters.lock_fallbacks.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Index {:?} is locked by another process; using an in-memory index",
                    index_path
                );
                self.build(source, codec)?
            }
            DiskIndex::Missing => {
                let index = self.build(source, codec)?;
                self.persist(source, &index_path, &index);
                index
            }
            DiskIndex::Stale(reason) => {
                self.counters.stale_discarded.fetch_add(1, Ordering::Relaxed);
                info!("Discarding stale index {:?}: {}", index_path, reason);
                let index = self.build(source, codec)?;
                self.persist(source, &index_path, &index);
                index
            }
            DiskIndex::Corrupt(e) => {
                let err = SpanError::Internal(format!(
                    "index {:?} for {:?} passed its version check but is unreadable: {}",
                    index_path, source, e
                ));
                error!("{}; rebuilding", err);
                self.counters.stale_discarded.fetch_add(1, Ordering::Relaxed);
                let index = self.build(source, codec)?;
                self.persist(source, &index_path, &index);
                index
            }
        };

        if let Some(dictionary) = &self.dictionary {
            index.validate_against(dictionary, self.config.validation, source)?;
        }
        Ok(Arc::new(index))
    }

    fn build<C: RecordCodec>(&self, source: &Path, codec: &C) -> Result<BinIndex> {
        let index = BinIndexBuilder::from_source(source, codec)?;
        self.counters.built_in_memory.fetch_add(1, Ordering::Relaxed);
        Ok(index)
    }

    fn read_existing(&self, source: &Path, index_path: &Path, source_mtime: SystemTime) -> DiskIndex {
        if !index_path.exists() {
            return DiskIndex::Missing;
        }

        let _guard = if self.config.disable_auto_index_creation {
            None
        } else {
            match lock::acquire(
                &Self::lock_path(source),
                LockMode::Shared,
                self.config.lock_timeout,
                self.config.lock_poll_interval,
            ) {
                Ok(LockOutcome::Acquired(guard)) => Some(guard),
                Ok(LockOutcome::Unavailable) => return DiskIndex::Locked,
                Err(e) => {
                    debug!("Reading {:?} without a lock: {}", index_path, e);
                    None
                }
            }
        };

        // stat under the lock so the mtime belongs to the bytes we read
        let read = fs::metadata(index_path).and_then(|m| Ok((m, fs::read(index_path)?)));
        let (metadata, data) = match read {
            Ok(found) => found,
            Err(e) => {
                debug!("Cannot read index {:?}: {}", index_path, e);
                return DiskIndex::Missing;
            }
        };

        let index = match decode_sidecar(&data) {
            Ok(SidecarContents::Index(index)) => index,
            Ok(SidecarContents::OtherVersion(version)) => {
                return DiskIndex::Stale(format!(
                    "format version {} (current {})",
                    version, FORMAT_VERSION
                ))
            }
            Err(e) => return DiskIndex::Corrupt(e),
        };

        match metadata.modified() {
            Ok(index_mtime) if index_mtime >= source_mtime => DiskIndex::Fresh(index),
            Ok(_) => DiskIndex::Stale("older than its source".into()),
            Err(e) => DiskIndex::Stale(format!("modification time unavailable: {}", e)),
        }
    }

    /// Write the side-car under an exclusive lock; every failure leaves the
    /// in-memory index in use.
    ///
    /// An unusable side-car is only ever replaced by the rename here, so a
    /// peer's fresh file is never removed by a process that lost the lock.
    fn persist(&self, source: &Path, index_path: &Path, index: &BinIndex) {
        if self.config.disable_auto_index_creation {
            return;
        }

        let guard = match lock::acquire(
            &Self::lock_path(source),
            LockMode::Exclusive,
            self.config.lock_timeout,
            self.config.lock_poll_interval,
        ) {
            Ok(LockOutcome::Acquired(guard)) => guard,
            Ok(LockOutcome::Unavailable) => {
                debug!("Index lock for {:?} busy; not persisting", source);
                return;
            }
            Err(e) => {
                report_unwritable(index_path, e.into());
                return;
            }
        };

        let temp_path = with_suffix(index_path, &format!("tmp.{}", std::process::id()));
        match write_atomically(&temp_path, index_path, &encode_sidecar(index)) {
            Ok(()) => {
                self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                info!("Wrote index {:?}", index_path);
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                report_unwritable(index_path, e);
            }
        }
        drop(guard);
    }
}

fn write_atomically(temp_path: &Path, final_path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, final_path)
}

fn report_unwritable(index_path: &Path, source: io::Error) {
    let err = SpanError::IndexDirUnwritable {
        path: index_path.to_path_buf(),
        source,
    };
    warn!(
        "{}; {}",
        err,
        err.remediation().unwrap_or("continuing with an in-memory index")
    );
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
