//! Gateway: JSON-over-HTTP API for chat, Chess.com analysis and the knowledge base.

mod error;
mod knowledge;
mod protocol;
mod server;

pub use error::ApiError;
pub use protocol::{
    AnalysisResponse, ChatRequest, PgnRequest, PlayerRequest, RecentGamesRequest, SearchRequest,
};
pub use server::{router, run_server, AppState};
