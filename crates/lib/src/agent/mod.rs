//! Multi-agent turn: greeting short-circuit, supervisor routing, then the knowledge agent or
//! the live-data agent. Upstream failures become an apology reply instead of an error.

mod knowledge;
mod live_data;
pub mod supervisor;

use serde::Serialize;
use std::time::Duration;

pub use knowledge::context_prompt;

use crate::config::{AgentsConfig, RetrievalConfig};
use crate::knowledge::{KnowledgeError, SourceRef};
use crate::llm::{ChatMessage, LlmBackend, LlmError, EMBED_BASE_DELAY};
use crate::prompts::{Prompts, APOLOGY_PREFIX, GREETING_REPLY};
use crate::routing::{AgentTag, Route};
use crate::session::{ConversationState, SessionMessage};
use crate::tools::ToolExecutor;
use crate::vector::VectorStore;

const GREETINGS: [&str; 12] = [
    "hi",
    "hello",
    "hey",
    "hiya",
    "howdy",
    "hola",
    "yo",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
    "hello hello",
];

const GREETING_ADDRESSEES: [&str; 3] = ["there", "rook", "everyone"];

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// What a specialist agent produced for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutcome {
    pub response: String,
    /// Context blocks handed to the model (knowledge agent only).
    pub rag_sources: usize,
    pub sources: Vec<SourceRef>,
    /// Username confirmed by a successful tool call.
    pub username: Option<String>,
}

impl AgentOutcome {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }
}

/// Reply to one query, with the updated conversation state.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub response: String,
    pub agent_used: AgentTag,
    pub rag_sources: usize,
    pub conversation_state: ConversationState,
}

/// The canned greeting when `query` is nothing but a greeting ("Hi!", "hello there", ...).
pub fn greeting_reply(query: &str) -> Option<&'static str> {
    let q = query
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    let q = q.split_whitespace().collect::<Vec<_>>().join(" ");
    let bare = GREETING_ADDRESSEES
        .iter()
        .find_map(|who| q.strip_suffix(&format!(" {}", who)))
        .map(|s| s.trim_end_matches(',').trim())
        .unwrap_or(q.as_str());
    GREETINGS.contains(&bare).then_some(GREETING_REPLY)
}

/// The last `limit` user/assistant turns as chat messages.
fn history_messages(history: &[SessionMessage], limit: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(limit);
    history[start..]
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(m.content.clone())),
            "assistant" => Some(ChatMessage::assistant(m.content.clone())),
            _ => None,
        })
        .collect()
}

/// Everything one turn needs; built per request since provider keys may come with the request.
pub struct ChessAssistant<'a> {
    llm: &'a dyn LlmBackend,
    store: &'a dyn VectorStore,
    tools: &'a dyn ToolExecutor,
    prompts: &'a Prompts,
    retrieval: &'a RetrievalConfig,
    agents: &'a AgentsConfig,
    embed_delay: Duration,
}

impl<'a> ChessAssistant<'a> {
    pub fn new(
        llm: &'a dyn LlmBackend,
        store: &'a dyn VectorStore,
        tools: &'a dyn ToolExecutor,
        prompts: &'a Prompts,
        retrieval: &'a RetrievalConfig,
        agents: &'a AgentsConfig,
    ) -> Self {
        Self {
            llm,
            store,
            tools,
            prompts,
            retrieval,
            agents,
            embed_delay: EMBED_BASE_DELAY,
        }
    }

    /// Base delay between embedding retries.
    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = delay;
        self
    }

    /// Full turn: greeting check, supervisor, specialist.
    pub async fn process_query(&self, query: &str, state: ConversationState) -> AssistantReply {
        if let Some(reply) = greeting_reply(query) {
            log::info!("agent: greeting, no model call");
            return finish(query, state, AgentTag::Greeting, AgentOutcome::text(reply));
        }
        let route = supervisor::classify(self.llm, self.prompts, query).await;
        self.process_routed(query, state, route).await
    }

    /// Run one specialist directly, skipping greeting detection and the supervisor.
    pub async fn process_routed(
        &self,
        query: &str,
        state: ConversationState,
        route: Route,
    ) -> AssistantReply {
        let result = match route {
            Route::Knowledge => {
                knowledge::KnowledgeAgent {
                    llm: self.llm,
                    store: self.store,
                    prompts: self.prompts,
                    retrieval: self.retrieval,
                    embed_delay: self.embed_delay,
                }
                .answer(query, &state.messages, self.agents.history_messages)
                .await
            }
            Route::LiveData => {
                live_data::LiveDataAgent {
                    llm: self.llm,
                    tools: self.tools,
                    prompts: self.prompts,
                    limits: self.agents,
                }
                .answer(query, &state.messages, state.known_username())
                .await
            }
        };
        match result {
            Ok(outcome) => finish(query, state, route.into(), outcome),
            Err(e) => {
                log::error!("agent: {} failed: {}", route.tag(), e);
                let outcome = AgentOutcome::text(format!("{}{}", APOLOGY_PREFIX, e));
                finish(query, state, AgentTag::Error, outcome)
            }
        }
    }
}

fn finish(
    query: &str,
    mut state: ConversationState,
    tag: AgentTag,
    outcome: AgentOutcome,
) -> AssistantReply {
    state.messages.push(SessionMessage::user(query));
    state
        .messages
        .push(SessionMessage::assistant(outcome.response.clone()));
    state.last_agent = Some(tag.as_str().to_string());
    state.sources = outcome.sources;
    if let Some(u) = outcome.username {
        state.username = Some(u);
    }
    AssistantReply {
        response: outcome.response,
        agent_used: tag,
        rag_sources: outcome.rag_sources,
        conversation_state: state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ToolCall, ToolCallFunction, ToolDefinition};
    use crate::tools::function_definition;
    use crate::vector::{Passage, QdrantError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Replays queued chat replies and records each request.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<ChatResponse, LlmError>>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, bool)>>,
        embed_calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(mut replies: Vec<Result<ChatResponse, LlmError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                ..Default::default()
            }
        }

        fn chat_calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            tools: Option<Vec<ToolDefinition>>,
        ) -> Result<ChatResponse, LlmError> {
            self.requests
                .lock()
                .unwrap()
                .push((messages, tools.is_some()));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Api("no scripted reply".to_string())))
        }

        async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError> {
            *self.embed_calls.lock().unwrap() += 1;
            Ok(inputs.iter().map(|_| vec![0.1, 0.2]).collect())
        }
    }

    struct FixedStore(Vec<Passage>);

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn search(
            &self,
            _vector: Vec<f32>,
            limit: usize,
            _score_threshold: f32,
        ) -> Result<Vec<Passage>, QdrantError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn search(
            &self,
            _vector: Vec<f32>,
            _limit: usize,
            _score_threshold: f32,
        ) -> Result<Vec<Passage>, QdrantError> {
            Err(QdrantError::Api("503 Service Unavailable".to_string()))
        }
    }

    /// Records executed calls; answers every call with a fixed string.
    #[derive(Default)]
    struct RecordingTools {
        executed: Mutex<Vec<(String, Value)>>,
        /// Usernames answered as not found.
        unknown: Vec<&'static str>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingTools {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![function_definition(
                "get_player_stats",
                "stats",
                json!({
                    "type": "object",
                    "properties": {"username": {"type": "string"}},
                    "required": ["username"]
                }),
            )]
        }

        async fn execute(&self, name: &str, args: &Value) -> Result<String, String> {
            self.executed
                .lock()
                .unwrap()
                .push((name.to_string(), args.clone()));
            let username = args["username"].as_str().unwrap_or_default();
            if self.unknown.contains(&username) {
                return Err(format!("Player '{}' not found on Chess.com", username));
            }
            Ok("Player: hikaru\nBlitz: 3250".to_string())
        }
    }

    fn text(content: &str) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            message: Some(ChatMessage::assistant(content)),
        })
    }

    fn tool_call(name: &str, args: Value) -> Result<ChatResponse, LlmError> {
        let mut msg = ChatMessage::assistant("");
        msg.tool_calls = Some(vec![ToolCall {
            id: "call_1".to_string(),
            typ: "function".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: args,
            },
        }]);
        Ok(ChatResponse { message: Some(msg) })
    }

    fn passage(content: &str, score: f32) -> Passage {
        Passage {
            content: content.to_string(),
            filename: "endgames.md".to_string(),
            chunk_index: 2,
            score,
            source: "uploaded_document".to_string(),
            content_type: "chess_knowledge".to_string(),
            search_query: None,
        }
    }

    struct Fixture {
        prompts: Prompts,
        retrieval: RetrievalConfig,
        agents: AgentsConfig,
        tools: RecordingTools,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                prompts: Prompts::bundled(),
                retrieval: RetrievalConfig::default(),
                agents: AgentsConfig::default(),
                tools: RecordingTools::default(),
            }
        }

        fn assistant<'a>(
            &'a self,
            llm: &'a dyn LlmBackend,
            store: &'a dyn VectorStore,
        ) -> ChessAssistant<'a> {
            ChessAssistant::new(
                llm,
                store,
                &self.tools,
                &self.prompts,
                &self.retrieval,
                &self.agents,
            )
            .with_embed_delay(Duration::from_millis(1))
        }
    }

    #[test]
    fn greetings_are_recognised() {
        for q in ["hi", "Hello!", "  hey there ", "Good morning, Rook.", "hello, everyone!!"] {
            assert_eq!(greeting_reply(q), Some(GREETING_REPLY), "{}", q);
        }
        for q in ["hi, who won the 1972 match?", "hello world", "", "there"] {
            assert_eq!(greeting_reply(q), None, "{}", q);
        }
    }

    #[tokio::test]
    async fn greeting_skips_the_model() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![]);
        let store = FixedStore(vec![]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("Hello!", ConversationState::default())
            .await;
        assert_eq!(reply.response, GREETING_REPLY);
        assert_eq!(reply.agent_used, AgentTag::Greeting);
        assert_eq!(reply.rag_sources, 0);
        assert_eq!(llm.chat_calls(), 0);
        assert_eq!(*llm.embed_calls.lock().unwrap(), 0);
        assert_eq!(reply.conversation_state.messages.len(), 2);
        assert_eq!(reply.conversation_state.last_agent.as_deref(), Some("greeting"));
    }

    #[tokio::test]
    async fn unknown_label_uses_knowledge_route() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![text("weather_agent"), text("Centralize the king.")]);
        let store = FixedStore(vec![passage("Activate the king in the endgame.", 0.8)]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("How should I play endgames?", ConversationState::default())
            .await;
        assert_eq!(reply.agent_used, AgentTag::RagAgent);
        assert_eq!(reply.response, "Centralize the king.");
        assert_eq!(reply.rag_sources, 1);
        assert_eq!(reply.conversation_state.sources.len(), 1);
        assert_eq!(reply.conversation_state.sources[0].filename, "endgames.md");

        let requests = llm.requests.lock().unwrap();
        let last_user = requests[1].0.last().unwrap();
        assert!(last_user.content.contains("[Source 1: endgames.md]"));
        assert!(last_user.content.contains("average relevance: 0.80"));
    }

    #[tokio::test]
    async fn supervisor_failure_uses_default_route() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::Api("500 upstream".to_string())),
            text("An answer."),
        ]);
        let store = FixedStore(vec![passage("Some theory.", 0.5)]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("Explain zugzwang", ConversationState::default())
            .await;
        assert_eq!(reply.agent_used, AgentTag::RagAgent);
        assert_eq!(reply.response, "An answer.");
    }

    #[tokio::test]
    async fn no_passages_gives_canned_reply_without_chat() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![text("rag_agent")]);
        let store = FixedStore(vec![]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("What is the Lucena position?", ConversationState::default())
            .await;
        assert_eq!(reply.agent_used, AgentTag::RagAgent);
        assert_eq!(reply.response, crate::prompts::NO_KNOWLEDGE_REPLY);
        assert_eq!(reply.rag_sources, 0);
        // Only the supervisor call reached the chat endpoint.
        assert_eq!(llm.chat_calls(), 1);
    }

    #[tokio::test]
    async fn missing_tool_argument_is_fed_back_not_executed() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![
            text("chess_agent"),
            tool_call("get_player_stats", json!({})),
            text("Which Chess.com username should I look up?"),
        ]);
        let store = FixedStore(vec![]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("How am I doing on Chess.com?", ConversationState::default())
            .await;
        assert_eq!(reply.agent_used, AgentTag::ChessAgent);
        assert_eq!(reply.response, "Which Chess.com username should I look up?");
        assert!(fx.tools.executed.lock().unwrap().is_empty());

        let requests = llm.requests.lock().unwrap();
        let tool_msg = requests[2].0.last().unwrap();
        assert_eq!(tool_msg.role, "tool");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.starts_with("error: "));
        assert!(tool_msg.content.contains("username"));
        assert_eq!(reply.conversation_state.username, None);
    }

    #[tokio::test]
    async fn successful_tool_call_remembers_username() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![
            text("chess_agent"),
            tool_call("get_player_stats", json!({"username": "hikaru"})),
            text("Hikaru is rated 3250 in blitz."),
        ]);
        let store = FixedStore(vec![]);
        let reply = fx
            .assistant(&llm, &store)
            .process_query("Stats for hikaru?", ConversationState::default())
            .await;
        assert_eq!(reply.response, "Hikaru is rated 3250 in blitz.");
        assert_eq!(reply.conversation_state.username.as_deref(), Some("hikaru"));
        assert_eq!(fx.tools.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_player_is_not_remembered() {
        let mut fx = Fixture::new();
        fx.tools.unknown = vec!["nosuchplayer"];
        let llm = ScriptedLlm::new(vec![
            text("chess_agent"),
            tool_call("get_player_stats", json!({"username": "nosuchplayer"})),
            text("I could not find that player."),
        ]);
        let store = FixedStore(vec![]);
        let state = ConversationState {
            username: Some("hikaru".to_string()),
            ..Default::default()
        };
        let reply = fx
            .assistant(&llm, &store)
            .process_query("Stats for nosuchplayer?", state)
            .await;
        assert_eq!(reply.agent_used, AgentTag::ChessAgent);
        assert_eq!(reply.conversation_state.username.as_deref(), Some("hikaru"));
        let requests = llm.requests.lock().unwrap();
        let tool_msg = requests[2].0.last().unwrap();
        assert_eq!(tool_msg.role, "tool");
        assert_eq!(
            tool_msg.content,
            "error: Player 'nosuchplayer' not found on Chess.com"
        );
    }

    #[tokio::test]
    async fn tool_calls_without_id_get_one() {
        let fx = Fixture::new();
        let mut msg = ChatMessage::assistant("");
        msg.tool_calls = Some(vec![ToolCall {
            id: String::new(),
            typ: "function".to_string(),
            function: ToolCallFunction {
                name: "get_player_stats".to_string(),
                arguments: json!({"username": "hikaru"}),
            },
        }]);
        let llm = ScriptedLlm::new(vec![
            Ok(ChatResponse { message: Some(msg) }),
            text("Done."),
        ]);
        let store = FixedStore(vec![]);
        fx.assistant(&llm, &store)
            .process_routed("hikaru stats", ConversationState::default(), Route::LiveData)
            .await;
        let requests = llm.requests.lock().unwrap();
        let sent = &requests[1].0;
        let assistant = &sent[sent.len() - 2];
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_0_0");
        assert_eq!(sent.last().unwrap().tool_call_id.as_deref(), Some("call_0_0"));
    }

    #[tokio::test]
    async fn remembered_username_reaches_the_system_prompt() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![text("My games?")]);
        let store = FixedStore(vec![]);
        let state = ConversationState {
            username: Some("magnuscarlsen".to_string()),
            ..Default::default()
        };
        fx.assistant(&llm, &store)
            .process_routed("Show my recent games", state, Route::LiveData)
            .await;
        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].0[0].content.contains("\"magnuscarlsen\""));
        assert!(requests[0].1);
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        let mut fx = Fixture::new();
        fx.agents.max_tool_rounds = 2;
        let llm = ScriptedLlm::new(vec![
            tool_call("get_player_stats", json!({"username": "a"})),
            tool_call("get_player_stats", json!({"username": "b"})),
            text("Final summary."),
        ]);
        let store = FixedStore(vec![]);
        let reply = fx
            .assistant(&llm, &store)
            .process_routed("compare a and b", ConversationState::default(), Route::LiveData)
            .await;
        assert_eq!(reply.response, "Final summary.");
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].1 && requests[1].1);
        assert!(!requests[2].1, "final call must not offer tools");
        assert_eq!(reply.conversation_state.username.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_apology() {
        let fx = Fixture::new();
        let llm = ScriptedLlm::new(vec![text("rag_agent")]);
        let reply = fx
            .assistant(&llm, &FailingStore)
            .process_query("Explain the Najdorf", ConversationState::default())
            .await;
        assert_eq!(reply.agent_used, AgentTag::Error);
        assert!(reply.response.starts_with(APOLOGY_PREFIX));
        assert!(reply.response.contains("503"));
        assert_eq!(reply.conversation_state.last_agent.as_deref(), Some("error"));
    }

    #[test]
    fn history_keeps_last_turns() {
        let history = vec![
            SessionMessage::user("1"),
            SessionMessage::assistant("2"),
            SessionMessage::user("3"),
        ];
        let msgs = history_messages(&history, 2);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "assistant");
        assert!(history_messages(&history, 0).is_empty());
    }
}
