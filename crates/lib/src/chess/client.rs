//! Chess.com PubAPI client (https://api.chess.com/pub by default).
//! Read-only, unauthenticated; the API expects a descriptive User-Agent.

use crate::config::ChessComConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Time controls reported by `/player/{username}/stats`, in display order.
pub const RATING_CATEGORIES: [&str; 4] = ["rapid", "blitz", "bullet", "daily"];

#[derive(Clone)]
pub struct ChessComClient {
    base_url: String,
    user_agent: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ChessComError {
    #[error("chess.com request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chess.com player not found: {0}")]
    NotFound(String),
    #[error("chess.com api error: {0}")]
    Api(String),
    #[error("invalid chess.com username: {0:?}")]
    InvalidUsername(String),
}

impl ChessComClient {
    pub fn new(client: reqwest::Client, config: &ChessComConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            client,
        }
    }

    /// GET and decode; 404 becomes `NotFound(path)`.
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ChessComError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ChessComError::NotFound(path.to_string()));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChessComError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }

    /// GET /player/{username}: None when the player does not exist.
    pub async fn player_profile(&self, username: &str) -> Result<Option<PlayerProfile>, ChessComError> {
        let path = format!("/player/{}", player_segment(username)?);
        match self.get_json(&path).await {
            Ok(p) => Ok(Some(p)),
            Err(ChessComError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET /player/{username}/stats: ratings per time control.
    pub async fn player_stats(&self, username: &str) -> Result<PlayerStats, ChessComError> {
        let path = format!("/player/{}/stats", player_segment(username)?);
        let raw: BTreeMap<String, serde_json::Value> = self.get_json(&path).await?;
        Ok(PlayerStats::from_raw(&raw))
    }

    /// GET /player/{username}/games/{YYYY}/{MM}: empty when the month has no archive.
    pub async fn monthly_games(
        &self,
        username: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<ArchivedGame>, ChessComError> {
        let path = format!(
            "/player/{}/games/{}/{:02}",
            player_segment(username)?,
            year,
            month
        );
        match self.get_json::<GamesResponse>(&path).await {
            Ok(data) => Ok(data.games),
            Err(ChessComError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Chess.com usernames are ASCII letters, digits, `_` and `-`.
pub fn is_valid_username(username: &str) -> bool {
    let name = username.trim();
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// The lowercase path segment for `username`; usernames are case-insensitive.
fn player_segment(username: &str) -> Result<String, ChessComError> {
    if !is_valid_username(username) {
        return Err(ChessComError::InvalidUsername(username.to_string()));
    }
    Ok(username.trim().to_ascii_lowercase())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub joined: i64,
    #[serde(default)]
    pub last_online: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub current: Option<u32>,
    pub best: Option<u32>,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl RatingSummary {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Win percentage rounded to one decimal; 0.0 without games.
    pub fn win_rate(&self) -> f64 {
        let total = self.games();
        if total == 0 {
            return 0.0;
        }
        (f64::from(self.wins) / f64::from(total) * 1000.0).round() / 10.0
    }
}

/// Ratings keyed by time control ("rapid", "blitz", "bullet", "daily").
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerStats {
    pub ratings: BTreeMap<String, RatingSummary>,
}

impl PlayerStats {
    fn from_raw(raw: &BTreeMap<String, serde_json::Value>) -> Self {
        let mut ratings = BTreeMap::new();
        for category in RATING_CATEGORIES {
            let Some(v) = raw.get(&format!("chess_{}", category)) else {
                continue;
            };
            let rating = |section: &str| {
                v.get(section)
                    .and_then(|s| s.get("rating"))
                    .and_then(|r| r.as_u64())
                    .map(|r| r as u32)
            };
            let record = |key: &str| {
                v.get("record")
                    .and_then(|r| r.get(key))
                    .and_then(|n| n.as_u64())
                    .unwrap_or(0) as u32
            };
            ratings.insert(
                category.to_string(),
                RatingSummary {
                    current: rating("last"),
                    best: rating("best"),
                    wins: record("win"),
                    losses: record("loss"),
                    draws: record("draw"),
                },
            );
        }
        Self { ratings }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamePlayer {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub rating: u32,
    /// "win", "checkmated", "resigned", "timeout", "agreed", ...
    #[serde(default)]
    pub result: String,
}

/// One game from a monthly archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchivedGame {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pgn: Option<String>,
    #[serde(default)]
    pub time_control: String,
    #[serde(default)]
    pub time_class: Option<String>,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub rated: bool,
    #[serde(default)]
    pub white: GamePlayer,
    #[serde(default)]
    pub black: GamePlayer,
}

impl ArchivedGame {
    /// The side played by `username`, if any.
    pub fn side_of(&self, username: &str) -> Option<&GamePlayer> {
        if self.white.username.eq_ignore_ascii_case(username) {
            Some(&self.white)
        } else if self.black.username.eq_ignore_ascii_case(username) {
            Some(&self.black)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct GamesResponse {
    #[serde(default)]
    games: Vec<ArchivedGame>,
}
