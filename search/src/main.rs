use anyhow::{Context, Result};
use clap::Parser;
use spimi_core::persist::{read_query_file, write_results};
use spimi_core::tokenizer::EnglishNormalizer;
use spimi_core::{DocId, IndexPaths, QueryConfig, Searcher};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "search")]
#[command(about = "Answer one query file against a built index", long_about = None)]
struct Args {
    /// Dictionary file
    #[arg(short, long)]
    dictionary: PathBuf,
    /// Postings file
    #[arg(short, long)]
    postings: PathBuf,
    /// Query file: query on the first line, forced document ids after it
    #[arg(short, long)]
    queries: PathBuf,
    /// Results file
    #[arg(short, long)]
    output: PathBuf,
    /// Document lengths file
    #[arg(short, long, default_value = "lengths.txt")]
    lengths: PathBuf,
    /// Fraction of the collection at which a bare term is ignored
    #[arg(long, default_value_t = spimi_core::config::DEFAULT_ELIMINATION_THRESHOLD)]
    threshold: f64,
    /// Scoring threads (defaults to available cores)
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config =
        QueryConfig { elimination_threshold: args.threshold, ..QueryConfig::default() };
    if let Some(w) = args.workers {
        config.workers = w;
    }
    let paths = IndexPaths::new(args.dictionary, args.postings, args.lengths);
    let searcher = Searcher::open(paths, config, EnglishNormalizer).context("open index")?;

    let query = read_query_file(&args.queries)
        .with_context(|| format!("read query file {}", args.queries.display()))?;
    let start = std::time::Instant::now();
    let results = searcher.search(&query.query, &query.forced_docs)?;
    let ids: Vec<DocId> = results.iter().map(|r| r.doc_id).collect();
    tracing::info!(results = ids.len(), took_s = start.elapsed().as_secs_f64(), "search finished");

    write_results(&args.output, &ids).with_context(|| format!("write {}", args.output.display()))?;
    Ok(())
}
