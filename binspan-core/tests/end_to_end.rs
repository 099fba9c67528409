//! End-to-end behaviour of the container, index store and range queries

use binspan_core::bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
use binspan_core::chunk::{Chunk, FileSpan};
use binspan_core::index::FORMAT_VERSION;
use binspan_core::query::{Feature, FeatureCodec, RangeQuery};
use binspan_core::store::{IndexStore, IndexStoreConfig};
use binspan_core::{DictionaryValidation, SequenceDictionary, SpanError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write `lines` as a container, ending a block after every `per_block` lines
fn write_source(path: &Path, lines: &[String], per_block: usize) {
    let mut writer = BgzfWriter::create(path).unwrap();
    for (i, line) in lines.iter().enumerate() {
        writeln!(writer, "{}", line).unwrap();
        if (i + 1) % per_block == 0 {
            writer.flush().unwrap();
        }
    }
    writer.finish().unwrap();
}

fn window_records(count: u64) -> Vec<String> {
    (0..count)
        .map(|i| format!("chr1\t{}\t{}\trec{}", i * 16384, i * 16384 + 100, i))
        .collect()
}

fn fast_config() -> IndexStoreConfig {
    IndexStoreConfig {
        lock_timeout: Duration::from_millis(200),
        lock_poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn names(features: Vec<Feature>) -> Vec<String> {
    features
        .iter()
        .filter_map(|f| f.extra_fields().next().map(str::to_string))
        .collect()
}

fn query_names(store: &IndexStore, source: &Path, seq: &str, start: u64, end: u64) -> Vec<String> {
    let mut query = RangeQuery::open(store, source, FeatureCodec).unwrap();
    let features = query
        .query(seq, start, end)
        .unwrap()
        .collect::<binspan_core::Result<Vec<_>>>()
        .unwrap();
    names(features)
}

fn set_index_older_than_source(source: &Path) {
    let source_mtime = fs::metadata(source).unwrap().modified().unwrap();
    let index = OpenOptions::new()
        .write(true)
        .open(IndexStore::index_path(source))
        .unwrap();
    index
        .set_modified(source_mtime - Duration::from_secs(60))
        .unwrap();
}

#[test]
fn test_records_in_one_block_query_as_one_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("one_block.bgz");
    let lines = window_records(10);
    write_source(&source, &lines, usize::MAX);

    // offsets of each record within the single block
    let mut offsets = vec![0u16];
    for line in &lines {
        offsets.push(offsets.last().unwrap() + line.len() as u16 + 1);
    }

    let store = IndexStore::new(fast_config());
    let query = RangeQuery::open(&store, &source, FeatureCodec).unwrap();
    let span = query.spans("chr1", 3 * 16384, 5 * 16384 + 100).unwrap();
    assert_eq!(
        span.chunks(),
        &[Chunk::new(
            VirtualOffset::new(0, offsets[3]),
            VirtualOffset::new(0, offsets[6])
        )]
    );
    query.close();

    assert_eq!(
        query_names(&store, &source, "chr1", 3 * 16384, 5 * 16384 + 100),
        ["rec3", "rec4", "rec5"]
    );
}

#[test]
fn test_adjacent_spans_merge() {
    let a = FileSpan::new([Chunk::from_raw(0, 100)]);
    let b = FileSpan::new([Chunk::from_raw(100, 200)]);
    assert_eq!(a.union(&b).chunks(), &[Chunk::from_raw(0, 200)]);
}

#[test]
fn test_stale_index_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("stale.bgz");
    write_source(&source, &window_records(5), 2);

    let store = IndexStore::new(fast_config());
    store.load_index(&source, &FeatureCodec).unwrap();
    set_index_older_than_source(&source);

    store.load_index(&source, &FeatureCodec).unwrap();
    let stats = store.stats();
    assert_eq!(stats.stale_discarded, 1);
    assert_eq!(stats.built_in_memory, 2);
    assert_eq!(stats.persisted, 2);

    let index_mtime = fs::metadata(IndexStore::index_path(&source))
        .unwrap()
        .modified()
        .unwrap();
    let source_mtime = fs::metadata(&source).unwrap().modified().unwrap();
    assert!(index_mtime >= source_mtime);

    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().loaded_from_disk, 1);
}

#[test]
fn test_held_lock_falls_back_to_memory() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("contended.bgz");
    write_source(&source, &window_records(8), 3);
    IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap();

    let holder = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(IndexStore::lock_path(&source))
        .unwrap();
    holder.lock().unwrap();

    let store = IndexStore::new(fast_config());
    let index = store.load_index(&source, &FeatureCodec).unwrap();
    let stats = store.stats();
    assert_eq!(stats.lock_fallbacks, 1);
    assert_eq!(stats.built_in_memory, 1);
    assert_eq!(stats.loaded_from_disk, 0);
    assert_eq!(stats.persisted, 0);
    assert_eq!(index.sequence_names(), ["chr1"]);
    assert_eq!(
        query_names(&store, &source, "chr1", 16384 * 7, 16384 * 7 + 1),
        ["rec7"]
    );

    holder.unlock().unwrap();
    let store = IndexStore::new(fast_config());
    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().loaded_from_disk, 1);
}

#[test]
fn test_stale_side_car_survives_when_writer_lock_is_busy() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("busy.bgz");
    write_source(&source, &window_records(4), 2);
    IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap();
    set_index_older_than_source(&source);
    let before = fs::read(IndexStore::index_path(&source)).unwrap();

    // a peer reading under a shared lock keeps the exclusive lock out of reach
    let reader = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(IndexStore::lock_path(&source))
        .unwrap();
    reader.lock_shared().unwrap();

    let store = IndexStore::new(fast_config());
    store.load_index(&source, &FeatureCodec).unwrap();
    let stats = store.stats();
    assert_eq!(stats.stale_discarded, 1);
    assert_eq!(stats.built_in_memory, 1);
    assert_eq!(stats.persisted, 0);
    assert_eq!(fs::read(IndexStore::index_path(&source)).unwrap(), before);

    reader.unlock().unwrap();
    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().persisted, 1);
}

#[test]
fn test_repeated_loads_answer_identically() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("idempotent.bgz");
    let mut rng = StdRng::seed_from_u64(7);
    let mut starts: Vec<u64> = (0..300).map(|_| rng.gen_range(0..2_000_000)).collect();
    starts.sort_unstable();
    let lines: Vec<String> = starts
        .iter()
        .enumerate()
        .map(|(i, s)| format!("chr1\t{}\t{}\tf{}", s, s + rng.gen_range(1..50_000), i))
        .collect();
    write_source(&source, &lines, 17);

    let store = IndexStore::new(fast_config());
    let built = store.load_index(&source, &FeatureCodec).unwrap();
    let loaded = store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().loaded_from_disk, 1);

    for _ in 0..50 {
        let start = rng.gen_range(0..2_000_000);
        let end = start + rng.gen_range(0..100_000);
        assert_eq!(
            built.chunks_for_interval("chr1", start, end).unwrap(),
            loaded.chunks_for_interval("chr1", start, end).unwrap()
        );
    }

    // every query returns exactly the overlapping records
    let (start, end) = (500_000, 700_000);
    let expected: Vec<String> = lines
        .iter()
        .filter(|l| {
            let cols: Vec<&str> = l.split('\t').collect();
            let (s, e): (u64, u64) = (cols[1].parse().unwrap(), cols[2].parse().unwrap());
            s < end && start < e
        })
        .map(|l| l.rsplit('\t').next().unwrap().to_string())
        .collect();
    assert_eq!(query_names(&store, &source, "chr1", start, end), expected);
}

#[test]
fn test_dictionary_mismatch() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("dict.bgz");
    let lines = vec![
        "chr1\t0\t10\ta".to_string(),
        "chrUn\t0\t10\tb".to_string(),
    ];
    write_source(&source, &lines, 10);

    let mut dict = SequenceDictionary::new();
    dict.push("chr1", 1000).unwrap();

    let strict = IndexStore::new(fast_config()).with_dictionary(dict.clone());
    let err = strict.load_index(&source, &FeatureCodec).unwrap_err();
    assert!(err.is_user_error());
    assert!(matches!(err, SpanError::SequenceNotInDictionary { ref name, .. } if name == "chrUn"));

    let lenient = IndexStore::new(IndexStoreConfig {
        validation: DictionaryValidation::AllowMissingSequences,
        ..fast_config()
    })
    .with_dictionary(dict);
    assert!(lenient.load_index(&source, &FeatureCodec).is_ok());
}

#[test]
fn test_disabled_creation_never_touches_disk() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("readonly.bgz");
    write_source(&source, &window_records(4), 2);
    let config = IndexStoreConfig {
        disable_auto_index_creation: true,
        ..fast_config()
    };

    let store = IndexStore::new(config.clone());
    store.load_index(&source, &FeatureCodec).unwrap();
    assert!(!IndexStore::index_path(&source).exists());
    assert!(!IndexStore::lock_path(&source).exists());
    assert_eq!(store.stats().persisted, 0);

    // an existing side-car is read without locking, and a stale one is kept on disk
    IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap();
    fs::remove_file(IndexStore::lock_path(&source)).unwrap();
    let store = IndexStore::new(config.clone());
    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().loaded_from_disk, 1);
    assert!(!IndexStore::lock_path(&source).exists());

    set_index_older_than_source(&source);
    let store = IndexStore::new(config);
    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().stale_discarded, 1);
    assert!(IndexStore::index_path(&source).exists());
}

fn corrupt_and_reload(source: &Path, edit: impl FnOnce(&mut Vec<u8>)) -> IndexStore {
    let index_path: PathBuf = IndexStore::index_path(source);
    let mut data = fs::read(&index_path).unwrap();
    edit(&mut data);
    fs::write(&index_path, &data).unwrap();

    let store = IndexStore::new(fast_config());
    store.load_index(source, &FeatureCodec).unwrap();
    store
}

#[test]
fn test_corrupt_side_car_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("corrupt.bgz");
    write_source(&source, &window_records(6), 2);
    IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap();

    let store = corrupt_and_reload(&source, |data| {
        let middle = data.len() / 2;
        data[middle] ^= 0x5a;
    });
    let stats = store.stats();
    assert_eq!(stats.loaded_from_disk, 0);
    assert_eq!(stats.built_in_memory, 1);
    assert_eq!(stats.persisted, 1);

    let store = corrupt_and_reload(&source, |data| data.truncate(10));
    assert_eq!(store.stats().persisted, 1);

    let store = IndexStore::new(fast_config());
    store.load_index(&source, &FeatureCodec).unwrap();
    assert_eq!(store.stats().loaded_from_disk, 1);
}

#[test]
fn test_other_version_side_car_is_stale() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("version.bgz");
    write_source(&source, &window_records(3), 1);
    IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap();

    let store = corrupt_and_reload(&source, |data| {
        data[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
    });
    let stats = store.stats();
    assert_eq!(stats.stale_discarded, 1);
    assert_eq!(stats.persisted, 1);
}

#[test]
fn test_unsorted_source_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("unsorted.bgz");
    let lines = vec!["chr1\t500\t600\ta".to_string(), "chr1\t100\t200\tb".to_string()];
    write_source(&source, &lines, 10);

    let err = IndexStore::new(fast_config())
        .load_index(&source, &FeatureCodec)
        .unwrap_err();
    assert!(matches!(err, SpanError::UnsortedSource { .. }));
    assert!(!IndexStore::index_path(&source).exists());
}

#[test]
fn test_concurrent_stores_agree() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("shared.bgz");
    write_source(&source, &window_records(20), 4);

    let spans: Vec<FileSpan> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let store = IndexStore::new(IndexStoreConfig::default());
                    let index = store.load_index(&source, &FeatureCodec).unwrap();
                    index.chunks_for_interval("chr1", 0, 20 * 16384).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(spans.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(spans[0].len(), 1);
}

#[test]
fn test_seek_to_reported_position_resumes_at_next_byte() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut writer = BgzfWriter::new(Vec::new());
    let mut payload = Vec::new();
    for _ in 0..40 {
        let len = rng.gen_range(1..500);
        let block: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        writer.write_all(&block).unwrap();
        writer.flush().unwrap();
        payload.extend_from_slice(&block);
    }
    let data = writer.finish().unwrap();

    for _ in 0..30 {
        let k = rng.gen_range(0..payload.len() - 1);
        let mut reader = BgzfReader::new(Cursor::new(data.clone()));
        let mut prefix = vec![0u8; k + 1];
        reader.read_exact(&mut prefix).unwrap();
        let position = reader.virtual_position();

        let mut fresh = BgzfReader::new(Cursor::new(data.clone()));
        fresh.seek(position).unwrap();
        let mut next = [0u8; 1];
        fresh.read_exact(&mut next).unwrap();
        assert_eq!(next[0], payload[k + 1], "after byte {}", k);
    }
}

#[test]
fn test_concatenated_source_queries_across_parts() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("joined.bgz");
    let mut data = Vec::new();
    for line in ["chr1\t0\t10\ta\n", "chr1\t20000\t20010\tb\n"] {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(line.as_bytes()).unwrap();
        data.extend_from_slice(&writer.finish().unwrap());
    }
    fs::write(&source, &data).unwrap();

    let store = IndexStore::new(fast_config());
    assert_eq!(query_names(&store, &source, "chr1", 20000, 20005), vec!["b"]);
    assert_eq!(query_names(&store, &source, "chr1", 0, 30000), vec!["a", "b"]);
}

#[test]
fn test_plain_file_is_not_a_container() {
    let temp_dir = TempDir::new().unwrap();
    let plain = temp_dir.path().join("plain.bed");
    File::create(&plain)
        .unwrap()
        .write_all(b"chr1\t0\t10\n")
        .unwrap();
    assert!(!binspan_core::bgzf::is_valid_container_path(&plain).unwrap());

    let err = IndexStore::new(fast_config())
        .load_index(&plain, &FeatureCodec)
        .unwrap_err();
    assert!(err.is_format_error());
}
