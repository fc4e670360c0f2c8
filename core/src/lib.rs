//! Disk-backed positional inverted index with SPIMI construction, boolean
//! retrieval and log-tf·idf ranking.

pub mod boolean;
pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod list_ops;
pub mod persist;
pub mod query;
pub mod search;
pub mod tokenizer;
pub mod vsm;

pub use config::{IndexConfig, IndexPaths, QueryConfig};
pub use error::{IndexError, Result};
pub use index::{DictionaryEntry, DocId, Position, Posting, PostingList};
pub use search::{ScoredDoc, Searcher};
