//! Chess data: Chess.com PubAPI client and a PGN reader for game statistics.

mod client;
pub mod pgn;

pub use client::{
    ArchivedGame, ChessComClient, ChessComError, GamePlayer, PlayerProfile, PlayerStats,
    RatingSummary, RATING_CATEGORIES,
};
pub use client::is_valid_username;
