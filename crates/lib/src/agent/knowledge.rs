//! Knowledge agent: retrieval-augmented answers from the uploaded documents.

use std::time::Duration;

use super::{history_messages, AgentError, AgentOutcome};
use crate::config::RetrievalConfig;
use crate::knowledge::{build_context, BuiltContext, Retriever};
use crate::llm::{ChatMessage, LlmBackend};
use crate::prompts::{Prompts, NO_KNOWLEDGE_REPLY};
use crate::session::SessionMessage;
use crate::vector::VectorStore;

pub(crate) struct KnowledgeAgent<'a> {
    pub llm: &'a dyn LlmBackend,
    pub store: &'a dyn VectorStore,
    pub prompts: &'a Prompts,
    pub retrieval: &'a RetrievalConfig,
    pub embed_delay: Duration,
}

/// User turn carrying the retrieved context.
pub fn context_prompt(built: &BuiltContext, query: &str) -> String {
    format!(
        "Context from the chess knowledge base (average relevance: {:.2}):\n{}\n\nUser question: {}\n\n\
         Answer using the context above where it is relevant and cite the sources you use. \
         If the question is not about chess, decline.",
        built.average_score(),
        built.context,
        query
    )
}

impl KnowledgeAgent<'_> {
    pub async fn answer(
        &self,
        query: &str,
        history: &[SessionMessage],
        history_limit: usize,
    ) -> Result<AgentOutcome, AgentError> {
        let passages = Retriever::new(self.llm, self.store)
            .with_expansion(self.retrieval.query_expansion)
            .with_embed_delay(self.embed_delay)
            .search(query, self.retrieval.top_k, self.retrieval.score_threshold)
            .await?;
        let built = build_context(&passages, self.retrieval.max_context_chars);
        if built.count() == 0 {
            log::info!("knowledge: no passages for query, sending canned reply");
            return Ok(AgentOutcome::text(NO_KNOWLEDGE_REPLY));
        }

        let mut messages = vec![ChatMessage::system(self.prompts.knowledge.clone())];
        messages.extend(history_messages(history, history_limit));
        messages.push(ChatMessage::user(context_prompt(&built, query)));
        let res = self.llm.chat(messages, None).await?;

        Ok(AgentOutcome {
            response: res.content().trim().to_string(),
            rag_sources: built.count(),
            sources: built.sources,
            username: None,
        })
    }
}
