pub mod fingerprint;

pub use fingerprint::{cosine_similarity, fingerprint, FINGERPRINT_DIM};

use serde::{Deserialize, Serialize};

use crate::types::{ChunkId, DocumentChunk, DocumentId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
    /// Matched chunk contents joined for prompt-context use.
    pub context: String,
}

impl SearchResult {
    pub fn from_ranked(query: impl Into<String>, ranked: Vec<(DocumentChunk, f32)>) -> Self {
        let context = ranked
            .iter()
            .map(|(chunk, _)| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let hits = ranked
            .into_iter()
            .map(|(chunk, score)| SearchHit {
                chunk_id: chunk.id,
                document_id: chunk.document_id,
                content: chunk.content,
                score,
            })
            .collect();

        Self {
            query: query.into(),
            hits,
            context,
        }
    }
}

/// Brute-force ranking: cosine against every chunk, descending score,
/// ties resolved by the order chunks were inserted. Linear scan by
/// design; fine at the corpus sizes this serves.
pub fn rank_chunks(
    query_fingerprint: &[f32],
    chunks: &[DocumentChunk],
    top_k: usize,
) -> Vec<(DocumentChunk, f32)> {
    // A zero query vector has no cosine ordering; nothing can match.
    if query_fingerprint.iter().all(|&x| x == 0.0) {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &DocumentChunk, f32)> = chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| {
            (
                position,
                chunk,
                cosine_similarity(query_fingerprint, &chunk.fingerprint),
            )
        })
        .collect();

    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    scored
        .into_iter()
        .take(top_k)
        .map(|(_, chunk, score)| (chunk.clone(), score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn chunk(document_id: DocumentId, index: usize, text: &str) -> DocumentChunk {
        DocumentChunk::new(document_id, index, text, fingerprint(text), 0)
    }

    #[test]
    fn test_rank_returns_at_most_top_k_sorted() {
        let doc = DocumentId::new_v4();
        let chunks = vec![
            chunk(doc, 0, "rust ownership and borrowing rules"),
            chunk(doc, 1, "tokio async runtime internals"),
            chunk(doc, 2, "sourdough bread baking schedule"),
            chunk(doc, 3, "rust borrowing rules for references"),
        ];

        let query = fingerprint("rust borrowing rules");
        let ranked = rank_chunks(&query, &chunks, 2);

        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let doc = DocumentId::new_v4();
        let chunks = vec![
            chunk(doc, 0, "alpha beta gamma"),
            chunk(doc, 1, "delta epsilon zeta"),
            chunk(doc, 2, "alpha beta gamma delta"),
        ];
        let query = fingerprint("alpha beta");

        let first: Vec<_> = rank_chunks(&query, &chunks, 3)
            .into_iter()
            .map(|(c, s)| (c.id, s))
            .collect();
        let second: Vec<_> = rank_chunks(&query, &chunks, 3)
            .into_iter()
            .map(|(c, s)| (c.id, s))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let doc = DocumentId::new_v4();
        // Identical content means identical fingerprints and scores.
        let chunks = vec![
            chunk(doc, 0, "identical text"),
            chunk(doc, 1, "identical text"),
        ];
        let query = fingerprint("identical text");

        let ranked = rank_chunks(&query, &chunks, 2);
        assert_eq!(ranked[0].0.chunk_index, 0);
        assert_eq!(ranked[1].0.chunk_index, 1);
    }

    #[test]
    fn test_result_context_concatenates_hits() {
        let doc = DocumentId::new_v4();
        let ranked = vec![
            (chunk(doc, 0, "first piece"), 0.9),
            (chunk(doc, 1, "second piece"), 0.5),
        ];
        let result = SearchResult::from_ranked("query", ranked);
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.context, "first piece\n\nsecond piece");
    }
}
