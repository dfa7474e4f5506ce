// Run configuration

use std::path::PathBuf;

use clap::Parser;

/// Materiality cutoffs for the classifier. The defaults are the empirical
/// values the tool has always shipped with; all three are exclusive bounds.
#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    /// A COLLSCAN is reported only when the record examined more documents
    /// than this.
    pub collscan_docs: u64,
    /// An in-memory SORT is reported only when it used more bytes than this.
    pub sort_mem_bytes: u64,
    /// A FETCH is reported only when it examined more than
    /// `returned + fetch_surplus` documents.
    pub fetch_surplus: u64,
}

pub const DEFAULT_COLLSCAN_DOCS: u64 = 1_000;
pub const DEFAULT_SORT_MEM_BYTES: u64 = 1 << 20;
pub const DEFAULT_FETCH_SURPLUS: u64 = 1_000;

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            collscan_docs: DEFAULT_COLLSCAN_DOCS,
            sort_mem_bytes: DEFAULT_SORT_MEM_BYTES,
            fetch_surplus: DEFAULT_FETCH_SURPLUS,
        }
    }
}

/// Command-line options
#[derive(Debug, Parser)]
#[command(name = "mangoprof", version, about = "Classify index usage from MongoDB profiler records")]
pub struct Cli {
    /// Database whose system.profile collection is analyzed
    #[arg(value_name = "DATABASE")]
    pub database: String,

    /// MongoDB connection URI
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    pub uri: String,

    /// Cursor batch size for the profiler record fetch
    #[arg(long, default_value_t = 100)]
    pub batch_size: u32,

    /// Documents a collection scan must examine before it is reported
    #[arg(long, default_value_t = DEFAULT_COLLSCAN_DOCS)]
    pub collscan_docs: u64,

    /// Bytes an in-memory sort must use before it is reported
    #[arg(long, default_value_t = DEFAULT_SORT_MEM_BYTES)]
    pub sort_mem_bytes: u64,

    /// Extra documents a fetch may examine beyond what it returns
    #[arg(long, default_value_t = DEFAULT_FETCH_SURPLUS)]
    pub fetch_surplus: u64,

    /// Also print unrecognized operators, unrecognized command shapes, and
    /// collections that could only be partially analyzed
    #[arg(long)]
    pub diagnostics: bool,

    /// Write the per-index use counts as CSV to this path
    #[arg(long, value_name = "PATH")]
    pub csv_out: Option<PathBuf>,

    /// Write the full aggregate (counts, buckets, diagnostics) as JSON
    #[arg(long, value_name = "PATH")]
    pub json_out: Option<PathBuf>,
}

impl Cli {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            collscan_docs: self.collscan_docs,
            sort_mem_bytes: self.sort_mem_bytes,
            fetch_surplus: self.fetch_surplus,
        }
    }
}
