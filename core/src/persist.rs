//! On-disk index store: text dictionary, binary postings, text lengths file,
//! plus the query and results files of the batch search front end.

use crate::config::IndexPaths;
use crate::error::{IndexError, Result};
use crate::index::{decode_postings, DictionaryEntry, DocId, PostingList};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Parse `<term> <offset> <length> <df>`.
pub(crate) fn parse_dictionary_line(line: &str) -> Option<(&str, DictionaryEntry)> {
    let mut fields = line.split_whitespace();
    let term = fields.next()?;
    let offset = fields.next()?.parse().ok()?;
    let length = fields.next()?.parse().ok()?;
    let df = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((term, DictionaryEntry { offset, length, df }))
}

pub(crate) fn write_dictionary_line<W: Write>(
    w: &mut W,
    term: &str,
    entry: &DictionaryEntry,
) -> std::io::Result<()> {
    writeln!(w, "{} {} {} {}", term, entry.offset, entry.length, entry.df)
}

/// Read the byte window `[offset, offset + length)` of `file`.
///
/// The window is checked against the file size before anything is allocated;
/// one reaching past the end fails with `UnexpectedEof`.
pub(crate) fn read_span(file: &mut File, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let size = file.metadata()?.len();
    let in_bounds = offset.checked_add(length).is_some_and(|end| end <= size);
    let len = match usize::try_from(length) {
        Ok(len) if in_bounds => len,
        _ => {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("bytes {offset}..+{length} exceed the {size}-byte file"),
            ))
        }
    };
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// In-memory term dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<String, DictionaryEntry>,
}

impl Dictionary {
    pub fn get(&self, term: &str) -> Option<&DictionaryEntry> { self.entries.get(term) }

    /// Document frequency, 0 for unknown terms.
    pub fn df(&self, term: &str) -> u32 { self.entries.get(term).map_or(0, |e| e.df) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DictionaryEntry)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), e))
    }
}

impl FromIterator<(String, DictionaryEntry)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, DictionaryEntry)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

pub fn load_dictionary(path: &Path) -> Result<Dictionary> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let Some((term, entry)) = parse_dictionary_line(&line) else {
            let path = path.to_path_buf();
            return Err(IndexError::CorruptDictionary { path, line: i + 1, content: line });
        };
        entries.insert(term.to_string(), entry);
    }
    tracing::debug!(path = %path.display(), terms = entries.len(), "loaded dictionary");
    Ok(Dictionary { entries })
}

/// Collection size and per-document squared length norms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentNorms {
    pub collection_size: u32,
    pub norms: HashMap<DocId, f64>,
}

impl DocumentNorms {
    /// Length norm of a document, 0 for unknown documents.
    pub fn get(&self, doc_id: DocId) -> f64 { self.norms.get(&doc_id).copied().unwrap_or(0.0) }
}

pub fn load_document_norms(path: &Path) -> Result<DocumentNorms> {
    let reader = BufReader::new(File::open(path)?);
    let corrupt = |line: usize, content: String| IndexError::CorruptLengthsFile {
        path: path.to_path_buf(),
        line,
        content,
    };
    let mut lines = reader.lines();
    let first = match lines.next() {
        Some(line) => line?,
        None => return Err(corrupt(1, String::new())),
    };
    let collection_size: u32 = first.trim().parse().map_err(|_| corrupt(1, first.clone()))?;
    let mut norms = HashMap::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let parsed = match (fields.next(), fields.next(), fields.next()) {
            (Some(d), Some(n), None) => d.parse::<DocId>().ok().zip(n.parse::<f64>().ok()),
            _ => None,
        };
        let Some((doc_id, norm)) = parsed else {
            return Err(corrupt(i + 2, line));
        };
        norms.insert(doc_id, norm);
    }
    Ok(DocumentNorms { collection_size, norms })
}

pub fn write_document_norms<W: Write>(w: &mut W, norms: &[(DocId, f64)]) -> std::io::Result<()> {
    writeln!(w, "{}", norms.len())?;
    for (doc_id, norm) in norms {
        writeln!(w, "{doc_id} {norm}")?;
    }
    Ok(())
}

/// Read-only handle on a built index.
///
/// Dictionary and norms are held in memory; postings are read per term.
#[derive(Debug, Clone)]
pub struct IndexReader {
    paths: IndexPaths,
    dictionary: Dictionary,
    norms: DocumentNorms,
}

impl IndexReader {
    pub fn open(paths: IndexPaths) -> Result<Self> {
        let dictionary = load_dictionary(&paths.dictionary)?;
        let norms = load_document_norms(&paths.lengths)?;
        tracing::info!(terms = dictionary.len(), docs = norms.collection_size, "opened index");
        Ok(Self { paths, dictionary, norms })
    }

    pub fn from_parts(paths: IndexPaths, dictionary: Dictionary, norms: DocumentNorms) -> Self {
        Self { paths, dictionary, norms }
    }

    pub fn dictionary(&self) -> &Dictionary { &self.dictionary }

    pub fn norms(&self) -> &DocumentNorms { &self.norms }

    pub fn collection_size(&self) -> u32 { self.norms.collection_size }

    /// Postings of `term`; an unknown term yields an empty list.
    pub fn retrieve_posting_list(&self, term: &str) -> Result<PostingList> {
        let Some(entry) = self.dictionary.get(term) else {
            return Ok(PostingList::new());
        };
        let truncated =
            |reason: String| IndexError::TruncatedPostingList { term: term.to_string(), reason };

        let mut file = File::open(&self.paths.postings)?;
        let buf = read_span(&mut file, entry.offset, entry.length).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => truncated(e.to_string()),
            _ => IndexError::Io(e),
        })?;
        drop(file);

        let list = decode_postings(&buf).map_err(|e| truncated(e.to_string()))?;
        if list.len() != entry.df as usize {
            tracing::warn!(
                term,
                df = entry.df,
                decoded = list.len(),
                "document frequency disagrees with postings"
            );
        }
        Ok(list)
    }
}

/// Query string and the explicitly listed documents of a query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFile {
    pub query: String,
    /// Ascending, to be scored regardless of boolean membership.
    pub forced_docs: Vec<DocId>,
}

pub fn read_query_file(path: &Path) -> Result<QueryFile> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    let query = match lines.next() {
        Some(line) => line?.trim().to_string(),
        None => String::new(),
    };
    let mut forced_docs = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let doc_id = trimmed.parse::<DocId>().map_err(|_| IndexError::CorruptQueryFile {
            path: path.to_path_buf(),
            line: i + 2,
            content: line.clone(),
        })?;
        forced_docs.push(doc_id);
    }
    forced_docs.sort_unstable();
    forced_docs.dedup();
    Ok(QueryFile { query, forced_docs })
}

/// Write ranked document ids as one space-separated line.
pub fn write_results(path: &Path, ranked: &[DocId]) -> Result<()> {
    let line = ranked.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(" ");
    let mut f = File::create(path)?;
    f.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{encode_postings, Posting};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn dictionary_line_needs_four_fields() {
        let (term, e) = parse_dictionary_line("court 10 4 2").unwrap();
        assert_eq!(term, "court");
        assert_eq!(e, DictionaryEntry { offset: 10, length: 4, df: 2 });
        assert!(parse_dictionary_line("court 10 4").is_none());
        assert!(parse_dictionary_line("court 10 4 2 9").is_none());
        assert!(parse_dictionary_line("court x 4 2").is_none());
        assert!(parse_dictionary_line("").is_none());
    }

    #[test]
    fn corrupt_dictionary_reports_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dictionary.txt");
        fs::write(&path, "a 0 3 1\nb 3 3\n").unwrap();
        match load_dictionary(&path) {
            Err(IndexError::CorruptDictionary { line, content, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "b 3 3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lengths_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lengths.txt");
        let mut buf = Vec::new();
        write_document_norms(&mut buf, &[(1, 1.5), (4, 2.0)]).unwrap();
        fs::write(&path, &buf).unwrap();
        let norms = load_document_norms(&path).unwrap();
        assert_eq!(norms.collection_size, 2);
        assert_eq!(norms.get(1), 1.5);
        assert_eq!(norms.get(4), 2.0);
        assert_eq!(norms.get(99), 0.0);
    }

    #[test]
    fn corrupt_lengths_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lengths.txt");
        fs::write(&path, "2\n1 1.5\n4\n").unwrap();
        assert_eq!(corrupt_lengths_line(&path), Some(3));
        fs::write(&path, "").unwrap();
        assert_eq!(corrupt_lengths_line(&path), Some(1));
        fs::write(&path, "many\n").unwrap();
        assert_eq!(corrupt_lengths_line(&path), Some(1));
    }

    fn is_truncated(r: Result<PostingList>) -> bool {
        matches!(r, Err(IndexError::TruncatedPostingList { .. }))
    }

    fn corrupt_lengths_line(path: &Path) -> Option<usize> {
        match load_document_norms(path) {
            Err(IndexError::CorruptLengthsFile { line, .. }) => Some(line),
            _ => None,
        }
    }

    fn write_index(dir: &Path, postings: &[u8], dictionary: &str) -> IndexPaths {
        let paths = IndexPaths::in_dir(dir);
        fs::write(&paths.postings, postings).unwrap();
        fs::write(&paths.dictionary, dictionary).unwrap();
        fs::write(&paths.lengths, "3\n1 1\n2 1\n3 1\n").unwrap();
        paths
    }

    #[test]
    fn retrieve_seeks_to_term_window() {
        let dir = tempdir().unwrap();
        let mut first = PostingList::new();
        first.insert(1, Posting::new(vec![2]));
        let mut second = PostingList::new();
        second.insert(2, Posting::new(vec![1, 4]));
        second.insert(3, Posting::new(vec![5]));
        let a = encode_postings(first.iter().map(|(d, p)| (*d, p)));
        let b = encode_postings(second.iter().map(|(d, p)| (*d, p)));
        let mut blob = a.clone();
        blob.extend_from_slice(&b);
        let dict = format!("x 0 {} 1\ny {} {} 2\n", a.len(), a.len(), b.len());
        let reader = IndexReader::open(write_index(dir.path(), &blob, &dict)).unwrap();

        assert_eq!(reader.retrieve_posting_list("y").unwrap(), second);
        assert_eq!(reader.retrieve_posting_list("x").unwrap(), first);
        assert!(reader.retrieve_posting_list("missing").unwrap().is_empty());
        assert_eq!(reader.collection_size(), 3);
    }

    #[test]
    fn short_postings_file_is_truncation() {
        let dir = tempdir().unwrap();
        let paths = write_index(dir.path(), &[0x81, 0x81, 0x82], "x 0 10 1\n");
        let reader = IndexReader::open(paths).unwrap();
        assert!(is_truncated(reader.retrieve_posting_list("x")));
    }

    #[test]
    fn oversized_window_is_truncation_not_a_panic() {
        let dir = tempdir().unwrap();
        let dict = "x 0 18446744073709551615 1\ny 18446744073709551615 1 1\nz 2 2 1\n";
        let reader = IndexReader::open(write_index(dir.path(), &[0x81, 0x81, 0x82], dict)).unwrap();
        for term in ["x", "y", "z"] {
            assert!(is_truncated(reader.retrieve_posting_list(term)), "{term}");
        }
    }

    #[test]
    fn window_cutting_a_group_is_truncation() {
        let dir = tempdir().unwrap();
        // doc 1, tf 2, positions 3 and 4; the window stops after the first position
        let paths = write_index(dir.path(), &[0x81, 0x82, 0x83, 0x84], "x 0 3 1\n");
        let reader = IndexReader::open(paths).unwrap();
        assert!(is_truncated(reader.retrieve_posting_list("x")));
    }

    #[test]
    fn query_file_parsing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.txt");
        fs::write(&path, "\"fertility treatment\" AND damages\n24\n3\n\n").unwrap();
        let q = read_query_file(&path).unwrap();
        assert_eq!(q.query, "\"fertility treatment\" AND damages");
        assert_eq!(q.forced_docs, vec![3, 24]);

        fs::write(&path, "x\nabc\n").unwrap();
        let err = read_query_file(&path).unwrap_err();
        assert!(matches!(err, IndexError::CorruptQueryFile { line: 2, .. }));
    }

    #[test]
    fn results_are_space_separated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_results(&path, &[5, 1, 9]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "5 1 9");
    }
}
