use crate::boolean::{to_postfix, BooleanEvaluator, Elimination};
use crate::config::{IndexPaths, QueryConfig};
use crate::error::{IndexError, Result};
use crate::index::DocId;
use crate::persist::IndexReader;
use crate::query::parse_query;
use crate::tokenizer::Normalizer;
use crate::vsm::{rank, QueryVector, Scorer};
use std::collections::HashSet;

/// One ranked result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Query front end over an opened index.
pub struct Searcher<N> {
    index: IndexReader,
    config: QueryConfig,
    normalizer: N,
    pool: rayon::ThreadPool,
}

impl<N: Normalizer> Searcher<N> {
    pub fn open(paths: IndexPaths, config: QueryConfig, normalizer: N) -> Result<Self> {
        Self::new(IndexReader::open(paths)?, config, normalizer)
    }

    pub fn new(index: IndexReader, config: QueryConfig, normalizer: N) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .build()
            .map_err(|e| IndexError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self { index, config, normalizer, pool })
    }

    pub fn index(&self) -> &IndexReader { &self.index }

    /// Documents matching the boolean form of `query`, ascending.
    pub fn boolean_matches(&self, query: &str) -> Result<Vec<DocId>> {
        let parsed = parse_query(query, &self.normalizer);
        let evaluator = BooleanEvaluator::new(&self.index, self.config.elimination_threshold);
        evaluator.evaluate(&to_postfix(&parsed.boolean), Elimination::Apply)
    }

    /// Run `query`: boolean filtering, then vector-space ranking.
    ///
    /// `forced` documents are scored and listed first, ascending; the boolean
    /// matches follow by descending score, skipping any forced document.
    pub fn search(&self, query: &str, forced: &[DocId]) -> Result<Vec<ScoredDoc>> {
        let parsed = parse_query(query, &self.normalizer);
        let evaluator = BooleanEvaluator::new(&self.index, self.config.elimination_threshold);
        let matches = evaluator.evaluate(&to_postfix(&parsed.boolean), Elimination::Apply)?;
        tracing::debug!(
            query,
            matches = matches.len(),
            forced = forced.len(),
            "boolean stage done"
        );

        let vector = QueryVector::new(
            &parsed.free_text,
            self.index.dictionary(),
            self.index.collection_size(),
        );
        let scorer = Scorer::new(&self.index, &self.pool);

        let mut forced_sorted = forced.to_vec();
        forced_sorted.sort_unstable();
        forced_sorted.dedup();
        let forced_set: HashSet<DocId> = forced_sorted.iter().copied().collect();
        let rest: Vec<DocId> = matches.into_iter().filter(|d| !forced_set.contains(d)).collect();

        let mut out: Vec<ScoredDoc> = scorer
            .score(&forced_sorted, &vector)?
            .into_iter()
            .map(|(doc_id, score)| ScoredDoc { doc_id, score })
            .collect();
        let mut ranked = scorer.score(&rest, &vector)?;
        rank(&mut ranked);
        out.extend(ranked.into_iter().map(|(doc_id, score)| ScoredDoc { doc_id, score }));
        tracing::info!(query, results = out.len(), "query complete");
        Ok(out)
    }
}
