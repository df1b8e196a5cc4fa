//! Routing between the specialist agents.
//!
//! The supervisor model answers with a free-form label; [`Route::from_label`] maps it onto
//! one of the known routes and falls back to the knowledge agent for anything else.

use serde::{Deserialize, Serialize};

/// Specialist agent chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Answer from the uploaded chess knowledge base.
    #[default]
    Knowledge,
    /// Answer from live Chess.com data through tools.
    LiveData,
}

impl Route {
    /// Label the supervisor is asked to produce for this route.
    pub fn tag(self) -> &'static str {
        match self {
            Route::Knowledge => "rag_agent",
            Route::LiveData => "chess_agent",
        }
    }

    /// Case-insensitive. Live-data labels are checked first so a reply naming both routes
    /// still reaches the tools.
    pub fn from_label(label: &str) -> Route {
        let l = label.trim().to_lowercase();
        if l.contains("chess_agent") || l.contains("live_data") {
            Route::LiveData
        } else if l.contains("rag_agent") || l.contains("knowledge") {
            Route::Knowledge
        } else {
            log::debug!("routing: unrecognised label {:?}, using default route", label);
            Route::default()
        }
    }
}

/// Which path produced a reply; echoed to clients as `agent_used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTag {
    Greeting,
    RagAgent,
    ChessAgent,
    Error,
}

impl AgentTag {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentTag::Greeting => "greeting",
            AgentTag::RagAgent => "rag_agent",
            AgentTag::ChessAgent => "chess_agent",
            AgentTag::Error => "error",
        }
    }
}

impl From<Route> for AgentTag {
    fn from(route: Route) -> Self {
        match route {
            Route::Knowledge => AgentTag::RagAgent,
            Route::LiveData => AgentTag::ChessAgent,
        }
    }
}

impl std::fmt::Display for AgentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
