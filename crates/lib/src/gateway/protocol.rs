//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

fn default_num_games() -> u32 {
    10
}

fn default_search_limit() -> usize {
    10
}

fn default_score_threshold() -> f32 {
    0.3
}

/// POST /analyze/chat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// The `conversation_state` blob returned by the previous turn.
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default)]
    pub qdrant_url: Option<String>,
    /// Accepted for compatibility with older clients; unused.
    #[serde(default, skip_serializing)]
    pub langsmith_key: Option<String>,
    /// Accepted for compatibility with older clients; unused.
    #[serde(default, skip_serializing)]
    pub tavily_key: Option<String>,
}

/// POST /analyze/player
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub langsmith_key: Option<String>,
}

/// POST /analyze/pgn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgnRequest {
    #[serde(default)]
    pub pgn_content: String,
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub langsmith_key: Option<String>,
}

/// POST /analyze/recent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentGamesRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_num_games")]
    pub num_games: u32,
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub langsmith_key: Option<String>,
}

/// Reply of the /analyze/{player,pgn,recent} endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<serde_json::Value>,
}

/// POST /api/knowledge/search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}
