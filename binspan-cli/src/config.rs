use anyhow::{anyhow, bail, Context};
use binspan_core::bgzf::WriterConfig;
use binspan_core::store::IndexStoreConfig;
use binspan_core::DictionaryValidation;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "binspan")]
#[command(about = "Block-compressed containers with range-query indexes")]
pub struct Cli {
    /// JSON file with `store` and `writer` settings; flags override it
    #[arg(long, env = "BINSPAN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Longest wait for an index lock, in milliseconds
    #[arg(long, env = "BINSPAN_LOCK_TIMEOUT_MS", global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Never create, update or delete index files
    #[arg(long, global = true)]
    pub no_index_creation: bool,

    /// Sequence dictionary (`name<TAB>length`, `.fai` works) to validate indexes against
    #[arg(long, global = true)]
    pub dict: Option<PathBuf>,

    /// Tolerate index sequences missing from the dictionary
    #[arg(long, global = true, requires = "dict")]
    pub allow_missing_sequences: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Compress a plain file into a BGZF container
    Compress {
        input: PathBuf,
        /// Output path (default: input with `.bgz` appended)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Deflate level 0-9
        #[arg(long)]
        level: Option<u32>,
    },
    /// Build (or load) the side-car index of a feature file
    Index { source: PathBuf },
    /// Print records overlapping a region (`name:start-end`, 0-based half-open)
    Query { source: PathBuf, region: String },
    /// Print the chunks covering a region
    Spans { source: PathBuf, region: String },
    /// Check whether a file is a BGZF container
    Check { path: PathBuf },
}

/// Settings file layout
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub store: IndexStoreConfig,
    pub writer: WriterConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {:?}", path))
    }
}

impl Cli {
    /// Settings file merged with command-line overrides
    pub fn resolve(&self) -> anyhow::Result<FileConfig> {
        let mut config = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        if let Some(ms) = self.lock_timeout_ms {
            config.store.lock_timeout = Duration::from_millis(ms);
        }
        if self.no_index_creation {
            config.store.disable_auto_index_creation = true;
        }
        if self.allow_missing_sequences {
            config.store.validation = DictionaryValidation::AllowMissingSequences;
        }
        Ok(config)
    }
}

/// A region `name:start-end`; the name may itself contain `:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub sequence: String,
    pub start: u64,
    pub end: u64,
}

impl std::str::FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (sequence, range) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("region '{}' is not name:start-end", s))?;
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| anyhow!("region '{}' is not name:start-end", s))?;
        let start = start.replace(',', "").parse().context("region start")?;
        let end = end.replace(',', "").parse().context("region end")?;
        if sequence.is_empty() {
            bail!("region '{}' has no sequence name", s);
        }
        Ok(Region {
            sequence: sequence.to_string(),
            start,
            end,
        })
    }
}
