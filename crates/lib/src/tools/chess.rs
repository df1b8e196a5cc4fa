//! Chess.com tools: player stats, PGN analysis, recent games.

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{json, Value};

use crate::chess::pgn::{self, PgnGame};
use crate::chess::{ArchivedGame, ChessComClient, PlayerProfile, PlayerStats, RATING_CATEGORIES};
use crate::tools::{function_definition, ToolDefinition, ToolExecutor};

const DEFAULT_RECENT_LIMIT: usize = 10;
const MAX_RECENT_LIMIT: usize = 50;
const MONTHS_SEARCHED: u32 = 3;
const SHOWN_RESULTS: usize = 5;

/// Executes the three chess tools against the Chess.com PubAPI.
#[derive(Clone)]
pub struct ChessTools {
    client: ChessComClient,
}

impl ChessTools {
    pub fn new(client: ChessComClient) -> Self {
        Self { client }
    }

    async fn player_stats(&self, username: &str) -> Result<String, String> {
        let profile = self
            .client
            .player_profile(username)
            .await
            .map_err(|e| format!("failed to fetch profile for {}: {}", username, e))?;
        let Some(profile) = profile else {
            return Err(format!("Player '{}' not found on Chess.com", username));
        };
        let stats = match self.client.player_stats(username).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("tools: stats for {} unavailable: {}", username, e);
                PlayerStats::default()
            }
        };
        Ok(format_player_report(username, &profile, &stats))
    }

    async fn recent_games(&self, username: &str, limit: usize) -> Result<String, String> {
        let now = chrono::Utc::now();
        let mut games: Vec<ArchivedGame> = Vec::new();
        for (year, month) in recent_months(now.year(), now.month(), MONTHS_SEARCHED) {
            let batch = self
                .client
                .monthly_games(username, year, month)
                .await
                .map_err(|e| format!("failed to fetch games for {}: {}", username, e))?;
            games.extend(batch);
            if games.len() >= limit {
                break;
            }
        }
        if games.is_empty() {
            return Err(format!("No recent games found for player {}", username));
        }
        games.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        games.truncate(limit);
        Ok(format_recent_games(username, &games))
    }
}

#[async_trait]
impl ToolExecutor for ChessTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            function_definition(
                "get_player_stats",
                "Get a Chess.com player's profile and current ratings.",
                json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string", "description": "Chess.com username"}
                    },
                    "required": ["username"]
                }),
            ),
            function_definition(
                "analyze_pgn",
                "Analyze a chess game given in PGN (Portable Game Notation).",
                json!({
                    "type": "object",
                    "properties": {
                        "pgn_content": {"type": "string", "description": "PGN text of the game"}
                    },
                    "required": ["pgn_content"]
                }),
            ),
            function_definition(
                "get_recent_games",
                "Get a Chess.com player's recent games with win rate and results.",
                json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string", "description": "Chess.com username"},
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of games (default 10)",
                            "minimum": 1,
                            "maximum": MAX_RECENT_LIMIT
                        }
                    },
                    "required": ["username"]
                }),
            ),
        ]
    }

    async fn execute(&self, name: &str, args: &Value) -> Result<String, String> {
        let str_arg = |key: &str| {
            args.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("{}: missing required argument '{}'", name, key))
        };
        match name {
            "get_player_stats" => {
                let username = str_arg("username")?;
                log::info!("tools: get_player_stats {}", username);
                self.player_stats(username).await
            }
            "analyze_pgn" => {
                let content = str_arg("pgn_content")?;
                log::info!("tools: analyze_pgn ({} bytes)", content.len());
                pgn_report(content)
            }
            "get_recent_games" => {
                let username = str_arg("username")?;
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .map(|n| (n as usize).clamp(1, MAX_RECENT_LIMIT))
                    .unwrap_or(DEFAULT_RECENT_LIMIT);
                log::info!("tools: get_recent_games {} (limit {})", username, limit);
                self.recent_games(username, limit).await
            }
            other => Err(format!("unknown tool: {}", other)),
        }
    }
}

/// `count` (year, month) pairs starting at the given month and walking backwards.
pub fn recent_months(year: i32, month: u32, count: u32) -> Vec<(i32, u32)> {
    let mut out = Vec::with_capacity(count as usize);
    let (mut y, mut m) = (year, month.clamp(1, 12));
    for _ in 0..count {
        out.push((y, m));
        if m == 1 {
            m = 12;
            y -= 1;
        } else {
            m -= 1;
        }
    }
    out
}

fn format_player_report(username: &str, profile: &PlayerProfile, stats: &PlayerStats) -> String {
    let display = if profile.username.is_empty() {
        username
    } else {
        profile.username.as_str()
    };
    let mut lines = vec![
        format!("Player: {}", display),
        format!("Status: {}", profile.status.as_deref().unwrap_or("unknown")),
        format!("Location: {}", profile.location.as_deref().unwrap_or("Unknown")),
        format!("Followers: {}", profile.followers),
    ];
    if let Some(name) = profile.name.as_deref() {
        lines.insert(1, format!("Name: {}", name));
    }
    lines.push(String::new());
    lines.push("Current Ratings:".to_string());
    let mut any = false;
    for category in RATING_CATEGORIES {
        let Some(r) = stats.ratings.get(category) else {
            continue;
        };
        let Some(current) = r.current else {
            continue;
        };
        any = true;
        let best = r
            .best
            .map(|b| format!(", best {}", b))
            .unwrap_or_default();
        lines.push(format!(
            "  {}: {} ({} games, {:.1}% wins{})",
            title_case(category),
            current,
            r.games(),
            r.win_rate(),
            best
        ));
    }
    if !any {
        lines.push("  No rating information available".to_string());
    }
    lines.join("\n")
}

fn pgn_report(content: &str) -> Result<String, String> {
    let game: PgnGame =
        pgn::parse_pgn(content).ok_or_else(|| "invalid PGN: no tags or moves found".to_string())?;
    let stats = pgn::game_stats(&game);
    let lines = [
        "Chess Game Analysis".to_string(),
        "=".repeat(20),
        String::new(),
        format!("White: {}", stats.white_player),
        format!("Black: {}", stats.black_player),
        format!("Result: {}", stats.result),
        format!("Date: {}", stats.date),
        format!("Event: {}", stats.event),
        format!("Time control: {}", stats.time_control),
        String::new(),
        "Opening:".to_string(),
        format!("  ECO: {}", stats.eco),
        format!("  Name: {}", stats.opening),
        format!("  Family: {}", pgn::opening_family(&stats.opening)),
        String::new(),
        "Game Statistics:".to_string(),
        format!("  Total moves: {} ({} plies)", stats.full_moves, stats.total_plies),
        format!("  Game length: {}", stats.game_length.as_str()),
        format!("  Captures: {}", stats.captures),
        format!("  Checks: {}", stats.checks),
        format!("  Tactical complexity: {:.2}", stats.tactical_complexity),
        format!("  Moves: {}", game.moves.join(" ")),
    ];
    Ok(lines.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Win,
    Loss,
    Draw,
}

fn outcome(result: &str) -> Outcome {
    match result {
        "win" => Outcome::Win,
        "agreed" | "repetition" | "stalemate" | "insufficient" | "50move"
        | "timevsinsufficient" => Outcome::Draw,
        _ => Outcome::Loss,
    }
}

fn score_line(game: &ArchivedGame) -> &'static str {
    match (outcome(&game.white.result), outcome(&game.black.result)) {
        (Outcome::Win, _) => "1-0",
        (_, Outcome::Win) => "0-1",
        _ => "1/2-1/2",
    }
}

fn format_recent_games(username: &str, games: &[ArchivedGame]) -> String {
    let mine: Vec<_> = games.iter().filter_map(|g| g.side_of(username)).collect();
    let wins = mine.iter().filter(|p| outcome(&p.result) == Outcome::Win).count();
    let draws = mine.iter().filter(|p| outcome(&p.result) == Outcome::Draw).count();
    let losses = mine.len() - wins - draws;
    let win_rate = if mine.is_empty() {
        0.0
    } else {
        wins as f64 / mine.len() as f64 * 100.0
    };
    let average_rating = if mine.is_empty() {
        "Unknown".to_string()
    } else {
        let sum: u64 = mine.iter().map(|p| u64::from(p.rating)).sum();
        format!("{}", (sum as f64 / mine.len() as f64).round() as u64)
    };

    let mut counts: std::collections::BTreeMap<String, usize> = Default::default();
    for g in games {
        let class = g
            .time_class
            .clone()
            .unwrap_or_else(|| g.time_control.clone());
        *counts.entry(class).or_default() += 1;
    }
    let most_played = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(k, _)| k)
        .unwrap_or_else(|| "Unknown".to_string());

    let mut lines = vec![
        format!("Recent Games for {}", username),
        "=".repeat(30),
        String::new(),
        format!("Total games analyzed: {}", games.len()),
        format!("Record: {} wins, {} losses, {} draws", wins, losses, draws),
        format!("Win rate: {:.1}%", win_rate),
        format!("Most played time control: {}", most_played),
        format!("Average rating: {}", average_rating),
    ];

    let pgns: Vec<&str> = games.iter().filter_map(|g| g.pgn.as_deref()).collect();
    if let Some(summary) = pgn::analyze_games(&pgns) {
        if let Some((opening, n)) = summary.most_common_openings.first() {
            lines.push(format!("Most common opening: {} ({} games)", opening, n));
        }
        lines.push(format!(
            "Average game length: {:.1} plies",
            summary.average_plies
        ));
    }

    lines.push(String::new());
    lines.push("Recent game results:".to_string());
    for (i, g) in games.iter().take(SHOWN_RESULTS).enumerate() {
        lines.push(format!(
            "  {}. {} ({}) vs {} ({}) - {} ({})",
            i + 1,
            g.white.username,
            g.white.rating,
            g.black.username,
            g.black.rating,
            score_line(g),
            g.time_control
        ));
    }
    lines.join("\n")
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::{GamePlayer, RatingSummary};

    fn game(white: (&str, u32, &str), black: (&str, u32, &str), end_time: i64) -> ArchivedGame {
        ArchivedGame {
            url: String::new(),
            pgn: None,
            time_control: "180".to_string(),
            time_class: Some("blitz".to_string()),
            end_time,
            rated: true,
            white: GamePlayer {
                username: white.0.to_string(),
                rating: white.1,
                result: white.2.to_string(),
            },
            black: GamePlayer {
                username: black.0.to_string(),
                rating: black.1,
                result: black.2.to_string(),
            },
        }
    }

    #[test]
    fn months_wrap_across_year() {
        assert_eq!(
            recent_months(2024, 2, 3),
            vec![(2024, 2), (2024, 1), (2023, 12)]
        );
        assert_eq!(recent_months(2024, 7, 1), vec![(2024, 7)]);
    }

    #[test]
    fn player_report_lists_ratings() {
        let profile = PlayerProfile {
            username: "hikaru".to_string(),
            status: Some("premium".to_string()),
            followers: 1200,
            location: Some("Florida".to_string()),
            ..Default::default()
        };
        let mut stats = PlayerStats::default();
        stats.ratings.insert(
            "blitz".to_string(),
            RatingSummary {
                current: Some(3250),
                best: Some(3300),
                wins: 3,
                losses: 1,
                draws: 0,
            },
        );
        let text = format_player_report("Hikaru", &profile, &stats);
        assert!(text.starts_with("Player: hikaru\nStatus: premium"));
        assert!(text.contains("Followers: 1200"));
        assert!(text.contains("  Blitz: 3250 (4 games, 75.0% wins, best 3300)"));

        let empty = format_player_report("x", &PlayerProfile::default(), &PlayerStats::default());
        assert!(empty.starts_with("Player: x"));
        assert!(empty.contains("No rating information available"));
    }

    #[test]
    fn recent_games_report_from_player_perspective() {
        let games = vec![
            game(("Hikaru", 3200, "win"), ("Opp1", 3000, "checkmated"), 30),
            game(("Opp2", 3100, "win"), ("hikaru", 3190, "resigned"), 20),
            game(("hikaru", 3210, "agreed"), ("Opp3", 3050, "agreed"), 10),
        ];
        let text = format_recent_games("hikaru", &games);
        assert!(text.contains("Total games analyzed: 3"));
        assert!(text.contains("Record: 1 wins, 1 losses, 1 draws"));
        assert!(text.contains("Win rate: 33.3%"));
        assert!(text.contains("Most played time control: blitz"));
        assert!(text.contains("Average rating: 3200"));
        assert!(text.contains("  1. Hikaru (3200) vs Opp1 (3000) - 1-0 (180)"));
        assert!(text.contains("  2. Opp2 (3100) vs hikaru (3190) - 1-0 (180)"));
        assert!(text.contains("  3. hikaru (3210) vs Opp3 (3050) - 1/2-1/2 (180)"));
    }

    #[test]
    fn pgn_report_includes_stats() {
        let text = pgn_report("[White \"A\"]\n[Black \"B\"]\n\n1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0").unwrap();
        assert!(text.starts_with("Chess Game Analysis"));
        assert!(text.contains("White: A"));
        assert!(text.contains("Result: 1-0"));
        assert!(text.contains("Total moves: 4 (7 plies)"));
        assert!(text.contains("Family: Other"));
        assert!(pgn_report("no moves here").is_err());
    }

    #[tokio::test]
    async fn unknown_tool_and_missing_args_are_rejected_without_network() {
        let client = ChessComClient::new(
            reqwest::Client::new(),
            &crate::config::ChessComConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                ..Default::default()
            },
        );
        let tools = ChessTools::new(client);
        let err = tools.execute("play_move", &json!({})).await.unwrap_err();
        assert!(err.contains("unknown tool"));
        let err = tools.execute("get_player_stats", &json!({})).await.unwrap_err();
        assert!(err.contains("username"));
        let out = tools
            .execute("analyze_pgn", &json!({"pgn_content": "1. d4 d5 *"}))
            .await
            .unwrap();
        assert!(out.contains("Total moves: 1 (2 plies)"));
    }
}
