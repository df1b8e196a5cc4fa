//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.rook/config.json`) and environment.
//! Provider secrets may also arrive per request; see `resolve_openai_key` and `resolve_qdrant`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM provider (OpenAI-compatible chat completions + embeddings).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Qdrant vector store holding the chess knowledge base.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Chess.com public API.
    #[serde(default)]
    pub chess_com: ChessComConfig,

    /// Knowledge retrieval tuning.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Agent loop limits.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Conversation session store limits.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Server bind, port, and upload limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 8000).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Maximum request body size for document uploads, in bytes (default 10 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_server_port() -> u16 {
    8000
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// LLM provider settings. `apiKey` is overridden by OPENAI_API_KEY env and by a key sent with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub temperature: f32,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
        }
    }
}

/// Qdrant settings. `url` and `apiKey` are overridden by QDRANT_URL / QDRANT_API_KEY env and by request values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Embedding dimension used when the collection has to be created.
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "chess_knowledge".to_string()
}

fn default_vector_size() -> usize {
    1536
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
            vector_size: default_vector_size(),
        }
    }
}

/// Chess.com PubAPI settings. The API rejects requests without a User-Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessComConfig {
    #[serde(default = "default_chess_com_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chess_com_base_url() -> String {
    "https://api.chess.com/pub".to_string()
}

fn default_user_agent() -> String {
    format!("rook-chess-assistant/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ChessComConfig {
    fn default() -> Self {
        Self {
            base_url: default_chess_com_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Retrieval settings for the knowledge agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Passages fetched per query (default 5).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum similarity score (default 0.3).
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    /// Upper bound on the context block passed to the model (default 6000 chars).
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// When a search finds nothing, retry with keyword expansions (default true).
    #[serde(default = "default_true")]
    pub query_expansion: bool,
}

fn default_top_k() -> usize {
    5
}

fn default_score_threshold() -> f32 {
    0.3
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            max_context_chars: default_max_context_chars(),
            query_expansion: true,
        }
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Maximum rounds of tool calls for the live-data agent before a final answer is forced (default 3).
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Prior messages passed to the live-data agent (default 6).
    #[serde(default = "default_agent_history")]
    pub history_messages: usize,
}

fn default_max_tool_rounds() -> usize {
    3
}

fn default_agent_history() -> usize {
    6
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            history_messages: default_agent_history(),
        }
    }
}

/// Session store limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Sessions kept in memory; the least recently updated is evicted beyond this (default 1000).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Messages kept per session (default 20).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_sessions() -> usize {
    1000
}

fn default_history_limit() -> usize {
    20
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            history_limit: default_history_limit(),
        }
    }
}

/// Resolved Qdrant connection settings for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub vector_size: usize,
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| non_empty(Some(&s)))
}

/// Resolve the OpenAI key: request value, then OPENAI_API_KEY env, then config.
pub fn resolve_openai_key(config: &Config, request_key: Option<&str>) -> Option<String> {
    non_empty(request_key)
        .or_else(|| env_non_empty("OPENAI_API_KEY"))
        .or_else(|| non_empty(config.llm.api_key.as_deref()))
}

/// Resolve Qdrant url and key. A URL sent with the request is used only with the key sent
/// alongside it; the env/config key is bound to the env/config URL.
pub fn resolve_qdrant(
    config: &Config,
    request_url: Option<&str>,
    request_key: Option<&str>,
) -> QdrantSettings {
    let (url, api_key) = match non_empty(request_url) {
        Some(url) => (url, non_empty(request_key)),
        None => (
            env_non_empty("QDRANT_URL")
                .unwrap_or_else(|| config.vector_store.url.trim().to_string()),
            non_empty(request_key)
                .or_else(|| env_non_empty("QDRANT_API_KEY"))
                .or_else(|| non_empty(config.vector_store.api_key.as_deref())),
        ),
    };
    QdrantSettings {
        url: url.trim_end_matches('/').to_string(),
        api_key,
        collection: config.vector_store.collection.clone(),
        vector_size: config.vector_store.vector_size,
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ROOK_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".rook").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Directory holding the config file (prompts live under it).
pub fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Load config from the default path (or ROOK_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
