use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use spimi_core::builder::SpimiBuilder;
use spimi_core::tokenizer::{EnglishNormalizer, Normalizer};
use spimi_core::{DocId, IndexConfig, IndexPaths};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One row of the case-law CSV export.
#[derive(Debug, Deserialize)]
struct CsvDoc {
    document_id: DocId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    court: String,
}

#[derive(Debug, Deserialize)]
struct JsonDoc {
    id: DocId,
    #[serde(default)]
    title: String,
    body: String,
}

/// Raw text of one document before normalization.
struct RawDoc {
    id: DocId,
    text: String,
}

impl From<CsvDoc> for RawDoc {
    fn from(d: CsvDoc) -> Self {
        Self { id: d.document_id, text: format!("{} {} {}", d.title, d.court, d.content) }
    }
}

impl From<JsonDoc> for RawDoc {
    fn from(d: JsonDoc) -> Self {
        Self { id: d.id, text: format!("{} {}", d.title, d.body) }
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a positional inverted index with SPIMI blocks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a CSV/JSON/JSONL file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(short, long)]
        input: PathBuf,
        /// Output dictionary file
        #[arg(short, long, default_value = "dictionary.txt")]
        dictionary: PathBuf,
        /// Output postings file
        #[arg(short, long, default_value = "postings.txt")]
        postings: PathBuf,
        /// Output document lengths file
        #[arg(short, long, default_value = "lengths.txt")]
        lengths: PathBuf,
        /// Documents per SPIMI block
        #[arg(long, default_value_t = spimi_core::config::DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Worker threads for document analysis (defaults to available cores)
        #[arg(long)]
        workers: Option<usize>,
        /// Scratch directory for block files
        #[arg(long, default_value = "tmp")]
        tmp_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, dictionary, postings, lengths, block_size, workers, tmp_dir } => {
            let paths = IndexPaths::new(dictionary, postings, lengths);
            let mut config = IndexConfig { block_size, tmp_dir, ..IndexConfig::default() };
            if let Some(w) = workers {
                config.workers = w;
            }
            build(&input, paths, config)
        }
    }
}

fn input_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_supported(p) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        if !is_supported(input) {
            bail!("unsupported input {} (expected .csv, .json or .jsonl)", input.display());
        }
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn is_supported(p: &Path) -> bool {
    matches!(p.extension().and_then(|s| s.to_str()), Some("csv" | "json" | "jsonl"))
}

fn open_buffered(file: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(file).with_context(|| format!("open {}", file.display()))?))
}

/// Stream the documents of one input file.
fn read_docs(file: &Path) -> Result<Box<dyn Iterator<Item = Result<RawDoc>>>> {
    let display = file.display().to_string();
    match file.extension().and_then(|s| s.to_str()) {
        Some("csv") => {
            let reader = csv::Reader::from_path(file).with_context(|| format!("open {display}"))?;
            Ok(Box::new(reader.into_deserialize::<CsvDoc>().map(move |r| {
                r.map(RawDoc::from).with_context(|| format!("bad CSV row in {display}"))
            })))
        }
        Some("jsonl") => {
            let lines = open_buffered(file)?.lines();
            Ok(Box::new(lines.filter_map(move |line| match line {
                Ok(l) if l.trim().is_empty() => None,
                Ok(l) => Some(
                    serde_json::from_str::<JsonDoc>(&l)
                        .map(RawDoc::from)
                        .with_context(|| format!("bad JSON line in {display}")),
                ),
                Err(e) => Some(Err(e.into())),
            })))
        }
        _ => {
            let json: serde_json::Value = serde_json::from_reader(open_buffered(file)?)
                .with_context(|| format!("parse {display}"))?;
            let docs: Vec<JsonDoc> = match json {
                serde_json::Value::Array(arr) => {
                    arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?
                }
                obj @ serde_json::Value::Object(_) => vec![serde_json::from_value(obj)?],
                _ => Vec::new(),
            };
            Ok(Box::new(docs.into_iter().map(|d| Ok(RawDoc::from(d)))))
        }
    }
}

/// Every document of the input files, ascending by id.
///
/// Blocks must reach the builder in increasing id order, so the whole
/// collection is ordered before the first block is cut.
fn collect_docs(files: &[PathBuf]) -> Result<Vec<RawDoc>> {
    let mut docs = Vec::new();
    for file in files {
        for doc in read_docs(file)? {
            docs.push(doc?);
        }
    }
    docs.sort_by_key(|d| d.id);
    if let Some(w) = docs.windows(2).find(|w| w[0].id == w[1].id) {
        bail!("document id {} appears more than once in the input", w[0].id);
    }
    Ok(docs)
}

fn build(input: &Path, paths: IndexPaths, config: IndexConfig) -> Result<()> {
    let files = input_files(input)?;
    let chunk_size = config.block_size.max(1);
    let docs = collect_docs(&files)?;
    tracing::info!(
        files = files.len(),
        documents = docs.len(),
        block_size = chunk_size,
        workers = config.workers,
        "indexing"
    );

    let normalizer = EnglishNormalizer;
    let mut builder =
        SpimiBuilder::new(paths.clone(), config).context("prepare block directories")?;
    for chunk in docs.chunks(chunk_size) {
        let normalized: Vec<(DocId, Vec<String>)> =
            chunk.par_iter().map(|d| (d.id, normalizer.normalize(&d.text))).collect();
        for (id, terms) in normalized {
            builder.add_document(id, terms)?;
        }
    }

    let summary = builder.finish().context("merge blocks")?;
    tracing::info!(
        documents = summary.documents,
        terms = summary.terms,
        blocks = summary.blocks,
        dictionary = %paths.dictionary.display(),
        "index build complete"
    );
    Ok(())
}
