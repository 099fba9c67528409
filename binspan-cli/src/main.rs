//! binspan - command-line access to BGZF containers and their indexes

mod config;

use anyhow::Context;
use binspan_core::bgzf::{is_valid_container_path, BgzfWriter};
use binspan_core::query::{FeatureCodec, RangeQuery};
use binspan_core::store::IndexStore;
use binspan_core::{SequenceDictionary, SpanError};
use clap::Parser;
use config::{Cli, Command, FileConfig, Region};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Serialize)]
struct IndexSummary<'a> {
    source: &'a Path,
    index: PathBuf,
    sequences: &'a [String],
    bins: usize,
    chunks: usize,
    unplaced: u64,
    stats: binspan_core::store::StoreStats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = cli.resolve()?;
    match run(&cli, config) {
        Err(e) => {
            if let Some(hint) = e.downcast_ref::<SpanError>().and_then(SpanError::remediation) {
                eprintln!("hint: {}", hint);
            }
            Err(e)
        }
        ok => ok,
    }
}

fn run(cli: &Cli, config: FileConfig) -> anyhow::Result<()> {
    match &cli.command {
        Command::Compress {
            input,
            output,
            level,
        } => {
            let mut writer_config = config.writer;
            if let Some(level) = level {
                writer_config.compression_level = *level;
            }
            let output = output.clone().unwrap_or_else(|| {
                let mut name = input.clone().into_os_string();
                name.push(".bgz");
                PathBuf::from(name)
            });
            compress(input, &output, writer_config)
        }
        Command::Index { source } => {
            let store = open_store(cli, config)?;
            let index = store.load_index(source, &FeatureCodec)?;
            let summary = IndexSummary {
                source,
                index: IndexStore::index_path(source),
                sequences: index.sequence_names(),
                bins: index.bin_count(),
                chunks: index.chunk_count(),
                unplaced: index.unplaced_count(),
                stats: store.stats(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Query { source, region } => {
            let region: Region = region.parse()?;
            let store = open_store(cli, config)?;
            let mut query = RangeQuery::open(&store, source, FeatureCodec)?;

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let mut count = 0u64;
            for feature in query.query(&region.sequence, region.start, region.end)? {
                writeln!(out, "{}", feature?.line)?;
                count += 1;
            }
            out.flush()?;
            query.close();
            info!("{} records overlap {}:{}-{}", count, region.sequence, region.start, region.end);
            Ok(())
        }
        Command::Spans { source, region } => {
            let region: Region = region.parse()?;
            let store = open_store(cli, config)?;
            let query = RangeQuery::open(&store, source, FeatureCodec)?;
            let span = query.spans(&region.sequence, region.start, region.end)?;
            for chunk in &span {
                println!("{}\t{}", chunk.start(), chunk.end());
            }
            info!("{} chunks, ~{} uncompressed bytes", span.len(), span.size());
            query.close();
            Ok(())
        }
        Command::Check { path } => {
            let valid = is_valid_container_path(path)?;
            println!("{}\t{}", path.display(), if valid { "bgzf" } else { "not-bgzf" });
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn open_store(cli: &Cli, config: FileConfig) -> anyhow::Result<IndexStore> {
    let store = IndexStore::new(config.store);
    Ok(match &cli.dict {
        Some(path) => store.with_dictionary(SequenceDictionary::from_path(path)?),
        None => store,
    })
}

fn compress(
    input: &Path,
    output: &Path,
    writer_config: binspan_core::bgzf::WriterConfig,
) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("opening {:?}", input))?;
    let mut reader = BufReader::new(file);
    let mut writer = BgzfWriter::create_with_config(output, writer_config)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.finish()?;
    info!("Compressed {} bytes from {:?} into {:?}", bytes, input, output);
    Ok(())
}
