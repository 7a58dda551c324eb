use anyhow::{bail, Result};
use std::collections::HashMap;

/// Plain-text formats the upload endpoint accepts.
const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "csv"];

const STOPWORDS: [&str; 60] = [
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "do", "does",
    "for", "from", "had", "has", "have", "he", "her", "his", "i", "if", "in", "into", "is", "it",
    "its", "may", "more", "not", "of", "on", "or", "our", "she", "should", "so", "such", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "to", "was", "we", "were",
    "what", "which", "who", "will", "with", "would", "you",
];

#[derive(Debug, Clone)]
pub struct ChunkSpan {
    pub text: String,
    pub start_offset: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub content: String,
    pub word_count: usize,
    pub keywords: Vec<String>,
    pub chunks: Vec<ChunkSpan>,
}

#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        // An overlap >= chunk size would never advance.
        let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn supports(file_name: &str) -> bool {
        extension(file_name)
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Decode, clean, chunk and summarize an uploaded file.
    pub fn process(&self, file_name: &str, bytes: &[u8]) -> Result<ProcessedDocument> {
        let text = self.extract_text(file_name, bytes)?;
        let content = clean_text(&text);
        if content.is_empty() {
            bail!("document {} contains no extractable text", file_name);
        }

        let word_count = content.split_whitespace().count();
        let keywords = extract_keywords(&content, 10);
        let chunks = chunk_text(&content, self.chunk_size, self.chunk_overlap);

        Ok(ProcessedDocument {
            content,
            word_count,
            keywords,
            chunks,
        })
    }

    fn extract_text(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let Some(ext) = extension(file_name) else {
            bail!("file {} has no extension", file_name);
        };
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            bail!("unsupported file format: .{}", ext);
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => bail!("file {} is not valid UTF-8 text", file_name),
        }
    }
}

fn extension(file_name: &str) -> Option<String> {
    file_name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Collapse runs of whitespace and drop blank lines.
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split into overlapping chunks, breaking at word boundaries where one
/// exists inside the window.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkSpan> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if end < chars.len() {
            // Back up to the last whitespace so words stay intact.
            if let Some(split) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if split > 0 {
                    end = start + split;
                }
            }
        }

        let text: String = chars[start..end].iter().collect();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(ChunkSpan {
                text: trimmed.to_string(),
                start_offset: start,
            });
        }

        if end >= chars.len() {
            break;
        }
        start += stride.min(end.saturating_sub(start).max(1));
    }

    chunks
}

/// Top-N terms by frequency, stopwords and short tokens excluded.
pub fn extract_keywords(text: &str, top_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
    {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(top_n).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_known_extensions() {
        assert!(DocumentProcessor::supports("notes.txt"));
        assert!(DocumentProcessor::supports("README.md"));
        assert!(DocumentProcessor::supports("data.CSV"));
        assert!(!DocumentProcessor::supports("report.pdf"));
        assert!(!DocumentProcessor::supports("noextension"));
    }

    #[test]
    fn test_process_rejects_unsupported_format() {
        let processor = DocumentProcessor::new(100, 20);
        assert!(processor.process("report.pdf", b"content").is_err());
    }

    #[test]
    fn test_process_rejects_binary_payload() {
        let processor = DocumentProcessor::new(100, 20);
        assert!(processor.process("data.txt", &[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let cleaned = clean_text("hello    world\n\n\n  spaced   out  \n");
        assert_eq!(cleaned, "hello world\nspaced out");
    }

    #[test]
    fn test_chunks_overlap_and_cover() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_text(text, 20, 8);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_offset, 0);
        // Every chunk after the first starts before the previous one ended.
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].start_offset < pair[0].start_offset + 20);
        }
        assert!(chunks.last().unwrap().text.ends_with("ten"));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("tiny", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny");
    }

    #[test]
    fn test_keywords_skip_stopwords() {
        let text = "the database stores the workflow and the workflow runs the database database";
        let keywords = extract_keywords(text, 3);
        assert_eq!(keywords[0], "database");
        assert_eq!(keywords[1], "workflow");
        assert!(!keywords.contains(&"the".to_string()));
    }

    #[test]
    fn test_process_end_to_end() {
        let processor = DocumentProcessor::new(50, 10);
        let body = "Maestro orchestrates agents. Agents call the completion API. \
                    Documents are chunked and fingerprinted for search.";
        let processed = processor.process("intro.txt", body.as_bytes()).unwrap();

        assert!(processed.word_count > 10);
        assert!(!processed.chunks.is_empty());
        assert!(!processed.keywords.is_empty());
    }
}
