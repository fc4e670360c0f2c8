use crate::DocId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, loading or querying an index.
///
/// Absence of a term or a document is never an error: retrieval yields an
/// empty posting list and scoring yields zero.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("corrupt dictionary {path}: line {line}: {content:?}")]
    CorruptDictionary {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("corrupt lengths file {path}: line {line}: {content:?}")]
    CorruptLengthsFile {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("truncated posting list for term {term:?}: {reason}")]
    TruncatedPostingList { term: String, reason: String },

    #[error("block merge failed: {0}")]
    BlockMergeError(String),

    #[error("postfix evaluation underflow: operator {operator} needs two operands, found {found}")]
    EvaluationStackUnderflow { operator: &'static str, found: usize },

    #[error("postfix evaluation left {remaining} operands on the stack")]
    UnbalancedEvaluation { remaining: usize },

    #[error("document {doc_id} arrived after document {previous}; ids must ascend across blocks")]
    DocumentOutOfOrder { doc_id: DocId, previous: DocId },

    #[error("document {0} was added twice")]
    DuplicateDocument(DocId),

    #[error("corrupt query file {path}: line {line}: {content:?}")]
    CorruptQueryFile {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Errors that point at a defect in this crate rather than at bad input or bad files.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            IndexError::EvaluationStackUnderflow { .. } | IndexError::UnbalancedEvaluation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_term() {
        let err = IndexError::TruncatedPostingList {
            term: "court".into(),
            reason: "incomplete varint".into(),
        };
        assert_eq!(err.to_string(), "truncated posting list for term \"court\": incomplete varint");
    }

    #[test]
    fn stack_errors_are_internal() {
        assert!(IndexError::EvaluationStackUnderflow { operator: "AND", found: 1 }.is_internal());
        assert!(IndexError::UnbalancedEvaluation { remaining: 2 }.is_internal());
        assert!(!IndexError::DuplicateDocument(3).is_internal());
    }
}
