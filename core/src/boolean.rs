//! Boolean retrieval: infix → postfix conversion and stack evaluation.

use crate::error::{IndexError, Result};
use crate::index::{doc_ids, DocId, Position, PostingList};
use crate::list_ops::{intersect, union};
use crate::persist::IndexReader;
use crate::query::{Op, QueryToken};
use std::collections::BTreeMap;

/// Operator-precedence conversion of a well-formed infix stream.
///
/// Both operators are left-associative and `AND` binds tighter than `OR`.
pub fn to_postfix(infix: &[QueryToken]) -> Vec<QueryToken> {
    let mut output = Vec::with_capacity(infix.len());
    let mut stack: Vec<QueryToken> = Vec::new();
    for token in infix {
        match token {
            QueryToken::LeftParen => stack.push(QueryToken::LeftParen),
            QueryToken::RightParen => {
                while let Some(top) = stack.pop() {
                    if top == QueryToken::LeftParen {
                        break;
                    }
                    output.push(top);
                }
            }
            QueryToken::Operator(op) => {
                while let Some(&QueryToken::Operator(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.extend(stack.pop());
                }
                stack.push(token.clone());
            }
            operand => output.push(operand.clone()),
        }
    }
    while let Some(top) = stack.pop() {
        if top != QueryToken::LeftParen {
            output.push(top);
        }
    }
    output
}

/// Whether bare terms may be dropped for being too common.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elimination {
    Apply,
    Bypass,
}

pub struct BooleanEvaluator<'a> {
    index: &'a IndexReader,
    threshold: f64,
}

impl<'a> BooleanEvaluator<'a> {
    pub fn new(index: &'a IndexReader, threshold: f64) -> Self { Self { index, threshold } }

    /// True when `term` occurs in at least `threshold` of the collection.
    pub fn is_eliminated(&self, term: &str) -> bool {
        let n = self.index.collection_size();
        let df = self.index.dictionary().df(term);
        n > 0 && f64::from(df) / f64::from(n) >= self.threshold
    }

    fn term_docs(&self, term: &str, elimination: Elimination) -> Result<Vec<DocId>> {
        if elimination == Elimination::Apply && self.is_eliminated(term) {
            tracing::debug!(term, "eliminated common term");
            return Ok(Vec::new());
        }
        Ok(doc_ids(&self.index.retrieve_posting_list(term)?))
    }

    /// Evaluate a postfix stream to an ascending list of document ids.
    pub fn evaluate(&self, postfix: &[QueryToken], elimination: Elimination) -> Result<Vec<DocId>> {
        let mut stack: Vec<Vec<DocId>> = Vec::new();
        for token in postfix {
            match token {
                QueryToken::Term(term) => stack.push(self.term_docs(term, elimination)?),
                QueryToken::Phrase(terms) => stack.push(self.resolve_phrase(terms)?),
                QueryToken::DocList(docs) => stack.push(docs.clone()),
                QueryToken::Operator(op) => {
                    if stack.len() < 2 {
                        return Err(IndexError::EvaluationStackUnderflow {
                            operator: op.name(),
                            found: stack.len(),
                        });
                    }
                    let operands = stack.split_off(stack.len() - 2);
                    let (left, right) = (&operands[0], &operands[1]);
                    stack.push(match op {
                        Op::And => intersect(left, right),
                        Op::Or => union(left, right),
                    });
                }
                // to_postfix never emits grouping tokens
                QueryToken::LeftParen | QueryToken::RightParen => {}
            }
        }
        match stack.len() {
            0 => Ok(Vec::new()),
            1 => Ok(stack.pop().unwrap_or_default()),
            remaining => Err(IndexError::UnbalancedEvaluation { remaining }),
        }
    }

    /// Documents containing `terms` at consecutive positions.
    ///
    /// Each term's positions are shifted back by its offset in the phrase, so
    /// a verbatim occurrence lines up on the position of the first term.
    pub fn resolve_phrase(&self, terms: &[String]) -> Result<Vec<DocId>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut aligned: Vec<BTreeMap<DocId, Vec<Position>>> = Vec::with_capacity(terms.len());
        let mut conjunction = Vec::with_capacity(terms.len() * 2);
        for (offset, term) in terms.iter().enumerate() {
            let list: PostingList = self.index.retrieve_posting_list(term)?;
            if offset > 0 {
                conjunction.push(QueryToken::Operator(Op::And));
            }
            conjunction.push(QueryToken::DocList(doc_ids(&list)));
            let offset = offset as Position;
            aligned.push(
                list.into_iter()
                    .map(|(doc_id, p)| {
                        let shifted = p
                            .positions
                            .into_iter()
                            .filter(|&pos| pos > offset)
                            .map(|pos| pos - offset);
                        (doc_id, shifted.collect())
                    })
                    .collect(),
            );
        }

        let candidates = self.evaluate(&to_postfix(&conjunction), Elimination::Bypass)?;
        let mut result = Vec::new();
        for doc_id in candidates {
            let mut lists = aligned.iter().map(|m| m.get(&doc_id));
            let Some(Some(first)) = lists.next() else { continue };
            let mut common = first.clone();
            for next in lists {
                match next {
                    Some(positions) => common = intersect(&common, positions),
                    None => common.clear(),
                }
                if common.is_empty() {
                    break;
                }
            }
            if !common.is_empty() {
                result.push(doc_id);
            }
        }
        tracing::debug!(phrase = ?terms, matches = result.len(), "resolved phrase");
        Ok(result)
    }

    /// Parse-free entry point for an infix stream.
    pub fn evaluate_infix(&self, infix: &[QueryToken]) -> Result<Vec<DocId>> {
        self.evaluate(&to_postfix(infix), Elimination::Apply)
    }
}
