//! Similarity search with keyword query expansion, and context assembly for the knowledge agent.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::KnowledgeError;
use crate::llm::{embed_with_backoff, LlmBackend, LlmError, EMBED_BASE_DELAY};
use crate::vector::{Passage, VectorStore};

/// Keyword -> alternative phrasings tried when the original query finds nothing.
const EXPANSIONS: [(&str, [&str; 3]); 6] = [
    ("opening", ["chess opening", "opening theory", "opening moves"]),
    ("endgame", ["chess endgame", "endgame technique", "endgame theory"]),
    ("tactic", ["chess tactics", "tactical motifs", "chess combinations"]),
    ("strategy", ["chess strategy", "strategic concepts", "positional play"]),
    ("player", ["chess player", "grandmaster", "chess master"]),
    ("game", ["chess game", "chess match", "chess analysis"]),
];

/// Queries tried in total, the original included.
const MAX_QUERIES: usize = 5;

/// Characters of content used to recognise the same chunk found twice.
const DEDUP_PREFIX: usize = 100;

/// Below this many remaining characters a passage that does not fit is dropped, not truncated.
const MIN_PARTIAL: usize = 100;

/// Where a context block came from; kept in the conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub chunk_index: u64,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltContext {
    pub context: String,
    pub scores: Vec<f32>,
    pub sources: Vec<SourceRef>,
}

impl BuiltContext {
    /// Number of `[Source i]` blocks in the context.
    pub fn count(&self) -> usize {
        self.sources.len()
    }

    pub fn average_score(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }
}

/// The query followed by expansions for each keyword it mentions, at most five in all.
pub fn expand_query(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut out = vec![query.to_string()];
    for (keyword, phrasings) in EXPANSIONS {
        if lower.contains(keyword) {
            out.extend(phrasings.iter().map(|p| p.to_string()));
        }
    }
    out.truncate(MAX_QUERIES);
    out
}

pub struct Retriever<'a> {
    llm: &'a dyn LlmBackend,
    store: &'a dyn VectorStore,
    expansion: bool,
    embed_delay: Duration,
}

impl<'a> Retriever<'a> {
    pub fn new(llm: &'a dyn LlmBackend, store: &'a dyn VectorStore) -> Self {
        Self {
            llm,
            store,
            expansion: true,
            embed_delay: EMBED_BASE_DELAY,
        }
    }

    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expansion = enabled;
        self
    }

    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = delay;
        self
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let mut vectors =
            embed_with_backoff(self.llm, vec![text.to_string()], self.embed_delay).await?;
        vectors
            .pop()
            .ok_or_else(|| LlmError::Decode("no embedding returned".to_string()).into())
    }

    /// Passages for `query`, best first. When nothing clears `score_threshold` and expansion
    /// is on, expanded queries are tried with half the limit and a 20% lower threshold until
    /// one of them finds something.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, KnowledgeError> {
        let vector = self.embed_one(query).await?;
        let mut results = self.store.search(vector, limit, score_threshold).await?;

        if results.is_empty() && self.expansion {
            for expanded in expand_query(query).into_iter().skip(1) {
                let vector = self.embed_one(&expanded).await?;
                let hits = self
                    .store
                    .search(vector, (limit / 2).max(1), score_threshold * 0.8)
                    .await?;
                results.extend(hits.into_iter().map(|mut p| {
                    p.search_query = Some(expanded.clone());
                    p
                }));
                if !results.is_empty() {
                    log::debug!("knowledge: expanded query '{}' matched", expanded);
                    break;
                }
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut seen = HashSet::new();
        results.retain(|p| {
            let prefix: String = p.content.chars().take(DEDUP_PREFIX).collect();
            seen.insert((prefix, p.filename.clone()))
        });
        results.truncate(limit);
        log::info!(
            "knowledge: retrieved {} passage(s) for query: {}",
            results.len(),
            query.chars().take(50).collect::<String>()
        );
        Ok(results)
    }
}

/// Format passages as numbered source blocks within `max_chars`. A passage that does not
/// fit is cut to the remaining space when more than 100 characters remain; assembly stops there.
pub fn build_context(passages: &[Passage], max_chars: usize) -> BuiltContext {
    let mut parts: Vec<String> = Vec::new();
    let mut built = BuiltContext::default();
    let mut total = 0usize;
    for (i, p) in passages.iter().enumerate() {
        if total >= max_chars {
            break;
        }
        let block = format!("[Source {}: {}]\n{}\n", i + 1, p.filename, p.content);
        let block_len = block.chars().count();
        let source = SourceRef {
            filename: p.filename.clone(),
            chunk_index: p.chunk_index,
            score: p.score,
        };
        if total + block_len <= max_chars {
            parts.push(block);
            total += block_len;
            built.scores.push(p.score);
            built.sources.push(source);
            continue;
        }
        let remaining = max_chars - total;
        if remaining > MIN_PARTIAL {
            let partial: String = p.content.chars().take(remaining - 50).collect();
            parts.push(format!("[Source {}: {}]\n{}...\n", i + 1, p.filename, partial));
            built.scores.push(p.score);
            built.sources.push(source);
        }
        break;
    }
    built.context = parts.join("\n");
    built
}
