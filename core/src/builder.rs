//! SPIMI index construction.
//!
//! Documents are buffered into fixed-size blocks. Each block is analysed in
//! parallel, inverted, and flushed to a block-local dictionary/postings pair
//! under the scratch directory. `finish` concatenates every term's block
//! postings into the final index and writes the lengths file.

use crate::config::{IndexConfig, IndexPaths};
use crate::error::{IndexError, Result};
use crate::index::{encode_postings, DictionaryEntry, DocId, Position, Posting};
use crate::persist::{
    parse_dictionary_line, read_span, write_dictionary_line, write_document_norms,
};
use crate::vsm::tf_weight;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Per-document term map, in first-occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTerms {
    pub doc_id: DocId,
    pub terms: Vec<(String, Posting)>,
    /// Sum of squared log-tf weights over the distinct terms.
    pub length_norm: f64,
}

pub fn analyze_document(doc_id: DocId, terms: &[String]) -> DocumentTerms {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<(String, Posting)> = Vec::new();
    for (i, term) in terms.iter().enumerate() {
        let pos = (i + 1) as Position;
        match slots.get(term.as_str()) {
            Some(&slot) => out[slot].1.positions.push(pos),
            None => {
                slots.insert(term.as_str(), out.len());
                out.push((term.clone(), Posting::new(vec![pos])));
            }
        }
    }
    let length_norm = out.iter().map(|(_, p)| tf_weight(p.tf()).powi(2)).sum();
    DocumentTerms { doc_id, terms: out, length_norm }
}

/// One term's postings inside a block, ascending by document.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTerm {
    pub term: String,
    pub postings: Vec<(DocId, Posting)>,
}

impl BlockTerm {
    pub fn df(&self) -> u32 { self.postings.len() as u32 }
}

/// Invert documents (already ascending by id) into block-local term postings.
pub fn invert_block(docs: Vec<DocumentTerms>) -> Vec<BlockTerm> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<BlockTerm> = Vec::new();
    for doc in docs {
        for (term, posting) in doc.terms {
            match slots.get(&term) {
                Some(&slot) => out[slot].postings.push((doc.doc_id, posting)),
                None => {
                    slots.insert(term.clone(), out.len());
                    out.push(BlockTerm { term, postings: vec![(doc.doc_id, posting)] });
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct BlockRef {
    block_id: usize,
    /// Byte offset of the term's record in the block dictionary.
    dict_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    pub terms: usize,
    pub blocks: usize,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

pub struct SpimiBuilder {
    paths: IndexPaths,
    config: IndexConfig,
    pool: rayon::ThreadPool,
    pending: Vec<(DocId, Vec<String>)>,
    /// Highest document id of the flushed blocks.
    last_flushed: Option<DocId>,
    blocks: usize,
    term_order: Vec<String>,
    block_map: HashMap<String, Vec<BlockRef>>,
    lengths: Vec<(DocId, f64)>,
}

impl SpimiBuilder {
    pub fn new(paths: IndexPaths, config: IndexConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .build()
            .map_err(|e| IndexError::Io(std::io::Error::other(e.to_string())))?;
        fs::create_dir_all(config.tmp_dir.join("dict"))?;
        fs::create_dir_all(config.tmp_dir.join("post"))?;
        Ok(Self {
            paths,
            config,
            pool,
            pending: Vec::new(),
            last_flushed: None,
            blocks: 0,
            term_order: Vec::new(),
            block_map: HashMap::new(),
            lengths: Vec::new(),
        })
    }

    fn block_dict(&self, block_id: usize) -> PathBuf {
        self.config.tmp_dir.join("dict").join(format!("{block_id}.txt"))
    }

    fn block_postings(&self, block_id: usize) -> PathBuf {
        self.config.tmp_dir.join("post").join(format!("{block_id}.txt"))
    }

    /// Queue a document's normalized terms. A full block is flushed immediately.
    pub fn add_document(&mut self, doc_id: DocId, terms: Vec<String>) -> Result<()> {
        if let Some(previous) = self.last_flushed {
            if doc_id == previous {
                return Err(IndexError::DuplicateDocument(doc_id));
            }
            if doc_id < previous {
                return Err(IndexError::DocumentOutOfOrder { doc_id, previous });
            }
        }
        self.pending.push((doc_id, terms));
        if self.pending.len() >= self.config.block_size.max(1) {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|(doc_id, _)| *doc_id);
        if let Some(w) = pending.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(IndexError::DuplicateDocument(w[0].0));
        }

        // fan-out, then join before anything touches the block files
        let docs: Vec<DocumentTerms> = self.pool.install(|| {
            pending.par_iter().map(|(doc_id, terms)| analyze_document(*doc_id, terms)).collect()
        });

        self.blocks += 1;
        let block_id = self.blocks;
        self.last_flushed = docs.last().map(|d| d.doc_id);
        self.lengths.extend(docs.iter().map(|d| (d.doc_id, d.length_norm)));
        let terms = invert_block(docs);
        tracing::info!(block_id, docs = pending.len(), terms = terms.len(), "writing block");
        self.write_block(block_id, &terms)
    }

    fn write_block(&mut self, block_id: usize, terms: &[BlockTerm]) -> Result<()> {
        let mut dict = BufWriter::new(File::create(self.block_dict(block_id))?);
        let mut post = BufWriter::new(File::create(self.block_postings(block_id))?);
        let mut post_offset = 0u64;
        let mut dict_offset = 0u64;
        for t in terms {
            let bytes = encode_postings(t.postings.iter().map(|(d, p)| (*d, p)));
            post.write_all(&bytes)?;
            let entry =
                DictionaryEntry { offset: post_offset, length: bytes.len() as u64, df: t.df() };
            let mut line = Vec::new();
            write_dictionary_line(&mut line, &t.term, &entry)?;
            dict.write_all(&line)?;

            let refs = self.block_map.entry(t.term.clone()).or_insert_with(|| {
                self.term_order.push(t.term.clone());
                Vec::new()
            });
            refs.push(BlockRef { block_id, dict_offset });

            post_offset += bytes.len() as u64;
            dict_offset += line.len() as u64;
        }
        dict.flush()?;
        post.flush()?;
        Ok(())
    }

    /// Flush the last block, merge all blocks into the final index and clear scratch space.
    ///
    /// On a failed merge the block files are kept and no final file is replaced.
    pub fn finish(mut self) -> Result<BuildSummary> {
        self.flush_block()?;
        tracing::info!(blocks = self.blocks, terms = self.term_order.len(), "merging blocks");
        match self.merge_blocks() {
            Ok(()) => {}
            Err(e) => {
                for p in [&self.paths.dictionary, &self.paths.postings, &self.paths.lengths] {
                    let _ = fs::remove_file(partial_path(p));
                }
                tracing::error!(
                    tmp = %self.config.tmp_dir.display(),
                    error = %e,
                    "merge failed; block files kept"
                );
                return Err(match e {
                    IndexError::Io(io) => IndexError::BlockMergeError(io.to_string()),
                    other => other,
                });
            }
        }
        for p in [&self.paths.dictionary, &self.paths.postings, &self.paths.lengths] {
            fs::rename(partial_path(p), p)?;
        }
        self.remove_scratch();
        Ok(BuildSummary {
            documents: self.lengths.len(),
            terms: self.term_order.len(),
            blocks: self.blocks,
        })
    }

    /// Dictionary record and encoded postings of `term` in one block.
    ///
    /// Block files are opened per reference and closed on return, so a merge
    /// holds at most two block files open whatever the block count.
    fn read_block_term(&self, term: &str, r: BlockRef) -> Result<(DictionaryEntry, Vec<u8>)> {
        let merge_err = |what: &str, e: std::io::Error| {
            IndexError::BlockMergeError(format!("block {} {what}: {e}", r.block_id))
        };
        let mut dict = BufReader::new(
            File::open(self.block_dict(r.block_id)).map_err(|e| merge_err("dictionary", e))?,
        );
        dict.seek(SeekFrom::Start(r.dict_offset))?;
        let mut line = String::new();
        dict.read_line(&mut line)?;
        let entry = match parse_dictionary_line(line.trim_end()) {
            Some((t, entry)) if t == term => entry,
            _ => {
                return Err(IndexError::BlockMergeError(format!(
                    "block {}: expected record for {term:?} at byte {}, found {:?}",
                    r.block_id,
                    r.dict_offset,
                    line.trim_end()
                )))
            }
        };
        let mut post =
            File::open(self.block_postings(r.block_id)).map_err(|e| merge_err("postings", e))?;
        let bytes = read_span(&mut post, entry.offset, entry.length)
            .map_err(|e| merge_err(&format!("postings for {term:?}"), e))?;
        Ok((entry, bytes))
    }

    fn merge_blocks(&self) -> Result<()> {
        let mut dict_out = BufWriter::new(File::create(partial_path(&self.paths.dictionary))?);
        let mut post_out = BufWriter::new(File::create(partial_path(&self.paths.postings))?);
        let mut offset = 0u64;
        for term in &self.term_order {
            let mut df = 0u32;
            let mut length = 0u64;
            for &r in &self.block_map[term] {
                let (entry, bytes) = self.read_block_term(term, r)?;
                post_out.write_all(&bytes)?;
                df += entry.df;
                length += entry.length;
            }
            write_dictionary_line(&mut dict_out, term, &DictionaryEntry { offset, length, df })?;
            offset += length;
        }
        dict_out.flush()?;
        post_out.flush()?;

        let mut lengths = self.lengths.clone();
        lengths.sort_by_key(|(doc_id, _)| *doc_id);
        let mut len_out = BufWriter::new(File::create(partial_path(&self.paths.lengths))?);
        write_document_norms(&mut len_out, &lengths)?;
        len_out.flush()?;
        Ok(())
    }

    fn remove_scratch(&self) {
        for sub in ["dict", "post"] {
            if let Err(e) = fs::remove_dir_all(self.config.tmp_dir.join(sub)) {
                tracing::warn!(error = %e, "could not remove block directory");
            }
        }
        // only succeeds when nothing else lives there
        let _ = fs::remove_dir(&self.config.tmp_dir);
    }
}

/// Build an index from `(doc_id, terms)` pairs in ascending id order.
pub fn build_index<I>(paths: IndexPaths, config: IndexConfig, docs: I) -> Result<BuildSummary>
where
    I: IntoIterator<Item = (DocId, Vec<String>)>,
{
    let mut builder = SpimiBuilder::new(paths, config)?;
    for (doc_id, terms) in docs {
        builder.add_document(doc_id, terms)?;
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{load_dictionary, IndexReader};
    use tempfile::tempdir;

    fn terms(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn config(tmp: &Path, block_size: usize) -> IndexConfig {
        IndexConfig { block_size, workers: 2, tmp_dir: tmp.join("tmp") }
    }

    #[test]
    fn analyze_collects_positions_and_norm() {
        let d = analyze_document(7, &terms("a b a c a"));
        assert_eq!(d.terms[0], ("a".to_string(), Posting::new(vec![1, 3, 5])));
        assert_eq!(d.terms[1], ("b".to_string(), Posting::new(vec![2])));
        assert_eq!(d.terms[2], ("c".to_string(), Posting::new(vec![4])));
        let wa = 1.0 + 3f64.log10();
        assert!((d.length_norm - (wa * wa + 1.0 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn empty_document_has_zero_norm() {
        let d = analyze_document(1, &[]);
        assert!(d.terms.is_empty());
        assert_eq!(d.length_norm, 0.0);
    }

    #[test]
    fn invert_orders_by_first_sight() {
        let docs = vec![analyze_document(1, &terms("x y")), analyze_document(2, &terms("y z"))];
        let block = invert_block(docs);
        let names: Vec<&str> = block.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert_eq!(block[1].df(), 2);
        assert_eq!(block[1].postings[0].0, 1);
        assert_eq!(block[1].postings[1].0, 2);
    }

    #[test]
    fn merge_concatenates_blocks() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let docs = vec![
            (1, terms("apple banana apple")),
            (2, terms("banana cherry")),
            (3, terms("apple cherry cherry")),
            (4, terms("durian")),
            (5, terms("apple")),
        ];
        let summary = build_index(paths.clone(), config(dir.path(), 2), docs).unwrap();
        assert_eq!(summary, BuildSummary { documents: 5, terms: 4, blocks: 3 });

        let reader = IndexReader::open(paths.clone()).unwrap();
        assert_eq!(reader.collection_size(), 5);
        let apple = reader.retrieve_posting_list("apple").unwrap();
        assert_eq!(apple.keys().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(apple[&1].positions, vec![1, 3]);
        assert_eq!(apple[&3].positions, vec![1]);
        assert_eq!(reader.dictionary().df("apple"), 3);
        assert_eq!(reader.dictionary().df("cherry"), 2);
        assert_eq!(reader.retrieve_posting_list("cherry").unwrap()[&3].positions, vec![2, 3]);

        // first-seen order and contiguous spans
        let text = fs::read_to_string(&paths.dictionary).unwrap();
        let order: Vec<&str> = text.lines().map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(order, vec!["apple", "banana", "cherry", "durian"]);
        let dict = load_dictionary(&paths.dictionary).unwrap();
        let total: u64 = dict.iter().map(|(_, e)| e.length).sum();
        assert_eq!(total, fs::metadata(&paths.postings).unwrap().len());

        assert!(!dir.path().join("tmp").exists());
    }

    #[test]
    fn unordered_docs_within_a_block_are_sorted() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let docs = vec![(9, terms("k")), (4, terms("k"))];
        build_index(paths.clone(), config(dir.path(), 10), docs).unwrap();
        let reader = IndexReader::open(paths).unwrap();
        let k = reader.retrieve_posting_list("k").unwrap();
        assert_eq!(k.keys().copied().collect::<Vec<_>>(), vec![4, 9]);
    }

    #[test]
    fn out_of_order_across_blocks_is_rejected() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let docs = vec![(5, terms("a")), (3, terms("b"))];
        let err = build_index(paths, config(dir.path(), 1), docs).unwrap_err();
        assert!(matches!(err, IndexError::DocumentOutOfOrder { doc_id: 3, previous: 5 }));
    }

    #[test]
    fn duplicate_in_block_is_rejected() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let docs = vec![(2, terms("a")), (2, terms("b"))];
        let err = build_index(paths, config(dir.path(), 5), docs).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDocument(2)));
    }

    #[test]
    fn corrupt_block_aborts_merge_and_keeps_scratch() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let cfg = config(dir.path(), 1);
        let tmp = cfg.tmp_dir.clone();
        let mut builder = SpimiBuilder::new(paths.clone(), cfg).unwrap();
        builder.add_document(1, terms("a b")).unwrap();
        builder.add_document(2, terms("b")).unwrap();
        fs::write(tmp.join("dict").join("1.txt"), "garbage\n").unwrap();

        let err = builder.finish().unwrap_err();
        assert!(matches!(err, IndexError::BlockMergeError(_)));
        assert!(tmp.join("dict").join("2.txt").exists());
        assert!(!paths.dictionary.exists());
        assert!(!partial_path(&paths.dictionary).exists());
    }

    #[test]
    fn oversized_block_record_fails_the_merge() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let cfg = config(dir.path(), 1);
        let tmp = cfg.tmp_dir.clone();
        let mut builder = SpimiBuilder::new(paths.clone(), cfg).unwrap();
        builder.add_document(1, terms("a b")).unwrap();
        builder.add_document(2, terms("a")).unwrap();
        // "a" is merged first and its record sits at byte 0
        fs::write(tmp.join("dict").join("1.txt"), "a 0 18446744073709551615 1\n").unwrap();

        let err = builder.finish().unwrap_err();
        assert!(matches!(err, IndexError::BlockMergeError(_)), "{err}");
        assert!(!paths.postings.exists());
        assert!(tmp.join("post").join("1.txt").exists());
    }

    #[test]
    fn merges_hundreds_of_blocks() {
        // one document per block; holding every block open would need 1200 descriptors
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let cfg = IndexConfig { block_size: 1, workers: 1, tmp_dir: dir.path().join("tmp") };
        let docs = (1..=600).map(|id| {
            let parity = if id % 2 == 0 { "even" } else { "odd" };
            (id, vec!["all".to_string(), parity.to_string()])
        });
        let summary = build_index(paths.clone(), cfg, docs).unwrap();
        assert_eq!(summary.blocks, 600);

        let reader = IndexReader::open(paths).unwrap();
        assert_eq!(reader.collection_size(), 600);
        assert_eq!(reader.dictionary().df("all"), 600);
        let even = reader.retrieve_posting_list("even").unwrap();
        assert_eq!(even.len(), 300);
        assert_eq!(even[&600].positions, vec![2]);
    }

    #[test]
    fn empty_collection_builds_empty_index() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let summary = build_index(paths.clone(), config(dir.path(), 4), Vec::new()).unwrap();
        assert_eq!(summary.documents, 0);
        let reader = IndexReader::open(paths).unwrap();
        assert_eq!(reader.collection_size(), 0);
        assert!(reader.dictionary().is_empty());
    }
}
