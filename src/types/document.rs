use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChunkId, DocumentId, DocumentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub file_name: String,
    pub content: String,
    pub status: DocumentStatus,
    pub word_count: usize,
    pub keywords: Vec<String>,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new_v4(),
            file_name: file_name.into(),
            content: String::new(),
            status: DocumentStatus::Processing,
            word_count: 0,
            keywords: Vec::new(),
            chunk_count: 0,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn mark_ready(
        &mut self,
        content: String,
        word_count: usize,
        keywords: Vec<String>,
        chunk_count: usize,
    ) {
        self.content = content;
        self.word_count = word_count;
        self.keywords = keywords;
        self.chunk_count = chunk_count;
        self.status = DocumentStatus::Ready;
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = DocumentStatus::Failed;
        self.processed_at = Some(Utc::now());
    }
}

/// One fingerprinted slice of a document. `chunk_index` preserves the
/// insertion order used as the search tie-break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub content: String,
    pub fingerprint: Vec<f32>,
    pub start_offset: usize,
    pub length: usize,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(
        document_id: DocumentId,
        chunk_index: usize,
        content: impl Into<String>,
        fingerprint: Vec<f32>,
        start_offset: usize,
    ) -> Self {
        let content = content.into();
        let length = content.len();
        Self {
            id: ChunkId::new_v4(),
            document_id,
            chunk_index,
            content,
            fingerprint,
            start_offset,
            length,
            created_at: Utc::now(),
        }
    }
}
