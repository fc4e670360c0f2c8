use crate::codec::{self, CodecError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type DocId = u32;
/// 1-based token position within a document.
pub type Position = u32;

/// Occurrences of one term in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Ascending token positions; their count is the term frequency.
    pub positions: Vec<Position>,
}

impl Posting {
    pub fn new(positions: Vec<Position>) -> Self { Self { positions } }

    pub fn tf(&self) -> u32 { self.positions.len() as u32 }
}

/// Postings of one term keyed by ascending document id.
pub type PostingList = BTreeMap<DocId, Posting>;

/// Dictionary record locating a term's postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Byte offset of the term's postings in the postings file.
    pub offset: u64,
    /// Number of encoded bytes.
    pub length: u64,
    /// Number of documents containing the term.
    pub df: u32,
}

/// Document ids of a posting list, ascending.
pub fn doc_ids(list: &PostingList) -> Vec<DocId> {
    list.keys().copied().collect()
}

/// Flatten `(doc_id, tf, positions...)` groups and variable-byte encode them.
pub fn encode_postings<'a, I>(postings: I) -> Vec<u8>
where
    I: IntoIterator<Item = (DocId, &'a Posting)>,
{
    let mut buf = Vec::new();
    for (doc_id, posting) in postings {
        codec::encode_into(doc_id, &mut buf);
        codec::encode_into(posting.tf(), &mut buf);
        for &pos in &posting.positions {
            codec::encode_into(pos, &mut buf);
        }
    }
    buf
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostingsDecodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A group declared more positions than the stream holds.
    #[error("doc {doc_id} declares tf {tf} but only {available} integers remain")]
    ShortGroup { doc_id: DocId, tf: u32, available: usize },
    /// A document id repeated or went backwards.
    #[error("doc {doc_id} follows doc {previous}")]
    Unordered { doc_id: DocId, previous: DocId },
}

/// Rebuild a posting list from its encoded bytes.
///
/// The whole byte window must decode into complete `(doc_id, tf, positions)` groups.
pub fn decode_postings(bytes: &[u8]) -> Result<PostingList, PostingsDecodeError> {
    let flat = codec::decode(bytes)?;
    let mut list = PostingList::new();
    let mut previous: Option<DocId> = None;
    let mut rest = flat.as_slice();
    while !rest.is_empty() {
        let doc_id = rest[0];
        let Some(&tf) = rest.get(1) else {
            return Err(PostingsDecodeError::ShortGroup { doc_id, tf: 0, available: 0 });
        };
        let body = &rest[2..];
        if body.len() < tf as usize {
            return Err(PostingsDecodeError::ShortGroup { doc_id, tf, available: body.len() });
        }
        if let Some(prev) = previous {
            if doc_id <= prev {
                return Err(PostingsDecodeError::Unordered { doc_id, previous: prev });
            }
        }
        list.insert(doc_id, Posting::new(body[..tf as usize].to_vec()));
        previous = Some(doc_id);
        rest = &body[tf as usize..];
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PostingList {
        let mut list = PostingList::new();
        list.insert(3, Posting::new(vec![1, 7]));
        list.insert(200, Posting::new(vec![42]));
        list
    }

    #[test]
    fn encode_flattens_groups() {
        let list = sample();
        let bytes = encode_postings(list.iter().map(|(d, p)| (*d, p)));
        assert_eq!(codec::decode(&bytes).unwrap(), vec![3, 2, 1, 7, 200, 1, 42]);
        assert_eq!(decode_postings(&bytes).unwrap(), list);
    }

    #[test]
    fn tf_is_position_count() {
        assert_eq!(Posting::new(vec![2, 5, 9]).tf(), 3);
        assert_eq!(Posting::default().tf(), 0);
    }

    #[test]
    fn short_group_is_rejected() {
        let bytes = codec::encode(&[3, 4, 1, 2]);
        assert_eq!(
            decode_postings(&bytes),
            Err(PostingsDecodeError::ShortGroup { doc_id: 3, tf: 4, available: 2 })
        );
        let lone = codec::encode(&[9]);
        assert!(matches!(
            decode_postings(&lone),
            Err(PostingsDecodeError::ShortGroup { doc_id: 9, .. })
        ));
    }

    #[test]
    fn codec_failures_pass_through() {
        // continuation byte with no terminator
        let err = decode_postings(&[0x01]).unwrap_err();
        assert_eq!(err, PostingsDecodeError::Codec(CodecError::Incomplete));
        assert_eq!(err.to_string(), "byte stream ends inside an integer");
        let err = PostingsDecodeError::ShortGroup { doc_id: 3, tf: 4, available: 2 };
        assert_eq!(err.to_string(), "doc 3 declares tf 4 but only 2 integers remain");
    }

    #[test]
    fn descending_doc_ids_are_rejected() {
        let bytes = codec::encode(&[5, 1, 1, 2, 1, 1]);
        assert_eq!(
            decode_postings(&bytes),
            Err(PostingsDecodeError::Unordered { doc_id: 2, previous: 5 })
        );
    }

    #[test]
    fn doc_ids_ascend() {
        assert_eq!(doc_ids(&sample()), vec![3, 200]);
    }
}
