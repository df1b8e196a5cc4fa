//! Upload pipeline: text extraction, chunking, embedding, upsert.

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::split::{split_text, CHUNK_OVERLAP, CHUNK_SIZE};
use super::KnowledgeError;
use crate::llm::{embed_with_backoff, LlmBackend, EMBED_BASE_DELAY};
use crate::vector::{Point, QdrantClient};

/// Chunks embedded per request.
pub const EMBED_BATCH: usize = 64;

const PREVIEW_CHARS: usize = 200;

const TEXT_TYPES: [&str; 3] = ["text/plain", "text/markdown", "application/x-chess-pgn"];
const TEXT_EXTENSIONS: [&str; 3] = [".txt", ".md", ".pgn"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResult {
    pub filename: String,
    pub chunks_created: usize,
    pub file_hash: String,
    pub content_preview: String,
}

/// True for text documents: a text content type, or a generic/missing type with a text extension.
pub fn is_supported_document(content_type: &str, filename: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if TEXT_TYPES.contains(&mime.as_str()) {
        return true;
    }
    let lower = filename.to_ascii_lowercase();
    (mime.is_empty() || mime == "application/octet-stream")
        && TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// `Err(UnsupportedType)` unless `is_supported_document` accepts the upload.
pub fn check_document(content_type: &str, filename: &str) -> Result<(), KnowledgeError> {
    if is_supported_document(content_type, filename) {
        return Ok(());
    }
    Err(KnowledgeError::UnsupportedType(format!(
        "{}. Supported types: text/plain, text/markdown, application/x-chess-pgn",
        if content_type.is_empty() { "unknown" } else { content_type }
    )))
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub struct DocumentIngestor<'a> {
    llm: &'a dyn LlmBackend,
    store: &'a QdrantClient,
    embed_delay: Duration,
}

impl<'a> DocumentIngestor<'a> {
    pub fn new(llm: &'a dyn LlmBackend, store: &'a QdrantClient) -> Self {
        Self {
            llm,
            store,
            embed_delay: EMBED_BASE_DELAY,
        }
    }

    /// Base delay between embedding retries.
    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = delay;
        self
    }

    /// Extract, chunk, embed and store one document. Nothing is stored if any batch fails.
    pub async fn ingest(
        &self,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<IngestResult, KnowledgeError> {
        check_document(content_type, filename)?;
        let text = std::str::from_utf8(bytes).map_err(|_| {
            KnowledgeError::InvalidDocument("file is not valid UTF-8 text".to_string())
        })?;
        if text.trim().is_empty() {
            return Err(KnowledgeError::InvalidDocument(
                "No text content could be extracted from the file".to_string(),
            ));
        }
        let file_hash = format!("{:x}", Sha256::digest(bytes));
        let chunks = split_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
        if chunks.is_empty() {
            return Err(KnowledgeError::InvalidDocument(
                "No valid chunks could be created from the file".to_string(),
            ));
        }

        self.store.ensure_collection().await?;

        let total = chunks.len();
        let mut points = Vec::with_capacity(total);
        for (batch_no, batch) in chunks.chunks(EMBED_BATCH).enumerate() {
            let vectors = embed_with_backoff(self.llm, batch.to_vec(), self.embed_delay).await?;
            for (i, (content, vector)) in batch.iter().zip(vectors).enumerate() {
                points.push(Point {
                    id: uuid::Uuid::new_v4().to_string(),
                    vector,
                    payload: json!({
                        "content": content,
                        "filename": filename,
                        "chunk_index": batch_no * EMBED_BATCH + i,
                        "total_chunks": total,
                        "content_type": "chess_knowledge",
                        "source": "uploaded_document",
                        "file_hash": file_hash,
                    }),
                });
            }
        }
        self.store.upsert(points).await?;
        log::info!("knowledge: stored {} chunk(s) for {}", total, filename);

        Ok(IngestResult {
            filename: filename.to_string(),
            chunks_created: total,
            file_hash,
            content_preview: preview(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_documents() {
        assert!(is_supported_document("text/plain", "notes"));
        assert!(is_supported_document("text/plain; charset=utf-8", "notes.txt"));
        assert!(is_supported_document("text/markdown", "openings.md"));
        assert!(is_supported_document("application/x-chess-pgn", "game"));
        assert!(is_supported_document("application/octet-stream", "Game.PGN"));
        assert!(is_supported_document("", "endgames.md"));
        assert!(!is_supported_document("application/octet-stream", "book.pdf"));
        assert!(!is_supported_document("application/pdf", "book.txt"));
        assert!(!is_supported_document("image/png", "board.png"));
    }

    #[test]
    fn unsupported_type_names_the_accepted_ones() {
        let err = check_document("application/pdf", "book.pdf").unwrap_err();
        assert!(matches!(err, KnowledgeError::UnsupportedType(_)));
        assert!(err.to_string().starts_with("unsupported file type: application/pdf."));
        let err = check_document("", "board.png").unwrap_err();
        assert!(err.to_string().contains("unknown"));
        assert!(check_document("text/markdown", "a.md").is_ok());
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "k".repeat(250);
        let p = preview(&long);
        assert_eq!(p.len(), 203);
        assert!(p.ends_with("..."));
    }
}
