//! Vector store: Qdrant REST client holding the chess knowledge base.

mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use qdrant::{CollectionStats, KnowledgeFile, Point, QdrantClient, QdrantError};

/// One retrieved chunk with its similarity score and source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub filename: String,
    pub chunk_index: u64,
    #[serde(rename = "similarity_score", alias = "score")]
    pub score: f32,
    pub source: String,
    pub content_type: String,
    /// Set when the passage was found through an expanded query rather than the original one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

/// Nearest-neighbour search over stored passages.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, QdrantError>;
}
