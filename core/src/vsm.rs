//! Vector-space ranking with log-tf·idf weights.
//!
//! Documents are weighted by log-tf alone (their stored length norm is the sum
//! of squared log-tf weights); queries are weighted by log-tf·idf.

use crate::error::Result;
use crate::index::{DocId, PostingList};
use crate::persist::{Dictionary, IndexReader};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

pub fn tf_weight(tf: u32) -> f64 {
    if tf > 0 { 1.0 + f64::from(tf).log10() } else { 0.0 }
}

pub fn idf(n: u32, df: u32) -> f64 {
    if n > 0 && df > 0 { f64::from(n).log10() - f64::from(df).log10() } else { 0.0 }
}

/// Weighted query terms and the query's squared length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryVector {
    pub weights: HashMap<String, f64>,
    pub length_norm: f64,
}

impl QueryVector {
    pub fn new(terms: &[String], dictionary: &Dictionary, n: u32) -> Self {
        let mut tf: HashMap<&str, u32> = HashMap::new();
        for t in terms {
            *tf.entry(t.as_str()).or_insert(0) += 1;
        }
        let weights: HashMap<String, f64> = tf
            .into_iter()
            .map(|(t, count)| (t.to_string(), tf_weight(count) * idf(n, dictionary.df(t))))
            .collect();
        let length_norm = weights.values().map(|w| w * w).sum();
        Self { weights, length_norm }
    }

    pub fn is_empty(&self) -> bool { self.weights.is_empty() }
}

/// Score one document given each query term's posting list.
///
/// Per term the contribution is `w_doc * w_query / (doc_norm * query_norm)`;
/// the total is `(Σ contributions)² * doc_norm * query_norm`.
pub fn score_document(
    doc_id: DocId,
    doc_norm: f64,
    query: &QueryVector,
    postings: &HashMap<String, PostingList>,
) -> f64 {
    if doc_norm == 0.0 || query.length_norm == 0.0 {
        return 0.0;
    }
    let sum: f64 = query
        .weights
        .iter()
        .map(|(term, q_w)| {
            let tf = postings.get(term).and_then(|pl| pl.get(&doc_id)).map_or(0, |p| p.tf());
            tf_weight(tf) * q_w / (doc_norm * query.length_norm)
        })
        .sum();
    sum * sum * doc_norm * query.length_norm
}

/// Descending score, ascending document id on ties.
pub fn rank(scores: &mut [(DocId, f64)]) {
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
}

pub struct Scorer<'a> {
    index: &'a IndexReader,
    pool: &'a rayon::ThreadPool,
}

impl<'a> Scorer<'a> {
    pub fn new(index: &'a IndexReader, pool: &'a rayon::ThreadPool) -> Self { Self { index, pool } }

    /// Fetch every query term's postings once.
    pub fn query_postings(&self, query: &QueryVector) -> Result<HashMap<String, PostingList>> {
        query
            .weights
            .keys()
            .map(|t| -> Result<(String, PostingList)> {
                Ok((t.clone(), self.index.retrieve_posting_list(t)?))
            })
            .collect()
    }

    /// Score `candidates` in parallel; output order follows `candidates`.
    pub fn score(&self, candidates: &[DocId], query: &QueryVector) -> Result<Vec<(DocId, f64)>> {
        let postings = self.query_postings(query)?;
        let norms = self.index.norms();
        let scores = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|&doc_id| {
                    (doc_id, score_document(doc_id, norms.get(doc_id), query, &postings))
                })
                .collect()
        });
        Ok(scores)
    }
}
