//! Chess knowledge base: document ingestion into the vector store and retrieval for the
//! knowledge agent.

mod ingest;
mod retrieve;
mod split;

pub use ingest::{check_document, is_supported_document, DocumentIngestor, IngestResult, EMBED_BATCH};
pub use retrieve::{build_context, expand_query, BuiltContext, Retriever, SourceRef};
pub use split::{split_text, CHUNK_OVERLAP, CHUNK_SIZE};

use crate::llm::LlmError;
use crate::vector::QdrantError;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Content type or file extension not accepted.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    /// File accepted but no usable text in it.
    #[error("{0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] QdrantError),
}
