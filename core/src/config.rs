use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fraction of the collection above which a bare term is skipped during boolean evaluation.
pub const DEFAULT_ELIMINATION_THRESHOLD: f64 = 0.4;

/// Documents per SPIMI block.
pub const DEFAULT_BLOCK_SIZE: usize = 1000;

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_block_size() -> usize { DEFAULT_BLOCK_SIZE }
fn default_threshold() -> f64 { DEFAULT_ELIMINATION_THRESHOLD }
fn default_tmp_dir() -> PathBuf { PathBuf::from("tmp") }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Scratch directory for per-block dictionary/postings files.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            workers: default_workers(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Terms with `df / N` at or above this value are eliminated from boolean evaluation.
    #[serde(default = "default_threshold")]
    pub elimination_threshold: f64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { elimination_threshold: default_threshold(), workers: default_workers() }
    }
}

/// Locations of the three persisted index files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPaths {
    pub dictionary: PathBuf,
    pub postings: PathBuf,
    pub lengths: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(dictionary: P, postings: P, lengths: P) -> Self {
        Self {
            dictionary: dictionary.as_ref().to_path_buf(),
            postings: postings.as_ref().to_path_buf(),
            lengths: lengths.as_ref().to_path_buf(),
        }
    }

    /// Conventional file names inside a single index directory.
    pub fn in_dir<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            dictionary: root.join("dictionary.txt"),
            postings: root.join("postings.txt"),
            lengths: root.join("lengths.txt"),
        }
    }
}
