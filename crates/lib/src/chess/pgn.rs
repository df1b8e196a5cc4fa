//! Minimal PGN reader: tag pairs plus SAN mainline.
//!
//! Moves are not validated against a board. Captures and checks are read from the SAN
//! markers (`x`, `+`, `#`), which is all the statistics below need.

use serde::Serialize;
use std::collections::BTreeMap;

pub const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// A parsed game: tag pairs and mainline moves in SAN, annotations removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PgnGame {
    pub headers: BTreeMap<String, String>,
    pub moves: Vec<String>,
    /// Result token found at the end of the movetext, if any.
    pub termination: Option<String>,
}

impl PgnGame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty() && *s != "?")
    }

    /// "Opening" tag, else the name embedded in Chess.com's ECOUrl.
    pub fn opening(&self) -> Option<String> {
        if let Some(o) = self.header("Opening") {
            return Some(o.to_string());
        }
        let url = self.header("ECOUrl")?;
        let slug = url.trim_end_matches('/').rsplit('/').next()?;
        if slug.is_empty() {
            return None;
        }
        Some(slug.replace('-', " "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameLength {
    Short,
    Medium,
    Long,
}

impl GameLength {
    pub fn from_plies(plies: usize) -> Self {
        if plies < 40 {
            GameLength::Short
        } else if plies < 80 {
            GameLength::Medium
        } else {
            GameLength::Long
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameLength::Short => "short",
            GameLength::Medium => "medium",
            GameLength::Long => "long",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStats {
    pub white_player: String,
    pub black_player: String,
    pub result: String,
    pub date: String,
    pub event: String,
    pub site: String,
    pub round: String,
    pub time_control: String,
    pub eco: String,
    pub opening: String,
    pub total_plies: usize,
    pub full_moves: usize,
    pub captures: usize,
    pub checks: usize,
    pub tactical_complexity: f64,
    pub game_length: GameLength,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GamesSummary {
    pub total_games: usize,
    pub average_plies: f64,
    pub average_tactical_complexity: f64,
    /// At most five (opening, count) pairs, most frequent first.
    pub most_common_openings: Vec<(String, usize)>,
    pub results_distribution: BTreeMap<String, usize>,
    /// Share of games won by White, in percent.
    pub white_win_percentage: f64,
}

/// Parse one PGN game. None when neither tag pairs nor moves are found.
pub fn parse_pgn(text: &str) -> Option<PgnGame> {
    let mut headers = BTreeMap::new();
    let mut movetext = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') && movetext.trim().is_empty() {
            if let Some((name, value)) = parse_tag(trimmed) {
                headers.insert(name, value);
            }
            continue;
        }
        // '%' escapes a whole line.
        if trimmed.starts_with('%') {
            continue;
        }
        movetext.push_str(line);
        movetext.push('\n');
    }

    let mut moves = Vec::new();
    let mut termination = None;
    for token in strip_annotations(&movetext).split_whitespace() {
        if RESULT_TOKENS.contains(&token) {
            termination = Some(token.to_string());
            continue;
        }
        if token.starts_with('$') {
            continue;
        }
        let san = token
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start_matches('.')
            .trim_end_matches(['!', '?']);
        if is_san(san) {
            moves.push(san.to_string());
        }
    }

    if headers.is_empty() && moves.is_empty() {
        return None;
    }
    Some(PgnGame {
        headers,
        moves,
        termination,
    })
}

/// `[Name "Value"]` with `\"` and `\\` escapes.
fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    let (name, rest) = inner.split_once(char::is_whitespace)?;
    let rest = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
    let value = rest.replace("\\\"", "\"").replace("\\\\", "\\");
    Some((name.to_string(), value))
}

/// Drop `{...}` and `;` comments and `(...)` variations, nested to any depth.
fn strip_annotations(movetext: &str) -> String {
    let mut out = String::with_capacity(movetext.len());
    let mut depth = 0usize;
    let mut in_brace = false;
    let mut in_line_comment = false;
    for c in movetext.chars() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push(' ');
            }
            continue;
        }
        if in_brace {
            if c == '}' {
                in_brace = false;
                out.push(' ');
            }
            continue;
        }
        match c {
            '{' => in_brace = true,
            ';' => in_line_comment = true,
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(' ');
            }
            _ if depth > 0 => {}
            _ => out.push(c),
        }
    }
    out
}

/// Castling, or a piece/pawn move naming a square on the board (files a-h, ranks 1-8).
fn is_san(token: &str) -> bool {
    if token.starts_with("O-O") || token.starts_with("0-0") {
        return true;
    }
    let bytes = token.as_bytes();
    matches!(bytes.first(), Some(b'K' | b'Q' | b'R' | b'B' | b'N' | b'a'..=b'h'))
        && bytes
            .windows(2)
            .any(|w| matches!(w, [b'a'..=b'h', b'1'..=b'8']))
        && !bytes.iter().any(|b| matches!(b, b'0' | b'9'))
}

/// Per-game statistics from tags and SAN markers.
pub fn game_stats(game: &PgnGame) -> GameStats {
    let tag = |name: &str| game.header(name).unwrap_or("Unknown").to_string();
    let plies = game.moves.len();
    let captures = game.moves.iter().filter(|m| m.contains('x')).count();
    let checks = game
        .moves
        .iter()
        .filter(|m| m.ends_with('+') || m.ends_with('#'))
        .count();
    let result = game
        .header("Result")
        .map(|s| s.to_string())
        .or_else(|| game.termination.clone())
        .unwrap_or_else(|| "*".to_string());
    GameStats {
        white_player: tag("White"),
        black_player: tag("Black"),
        result,
        date: tag("Date"),
        event: tag("Event"),
        site: tag("Site"),
        round: tag("Round"),
        time_control: tag("TimeControl"),
        eco: tag("ECO"),
        opening: game.opening().unwrap_or_else(|| "Unknown".to_string()),
        total_plies: plies,
        full_moves: plies.div_ceil(2),
        captures,
        checks,
        tactical_complexity: (captures + checks) as f64 / plies.max(1) as f64,
        game_length: GameLength::from_plies(plies),
    }
}

/// Opening family from an opening name; "Other" when no family matches.
pub fn opening_family(opening: &str) -> &'static str {
    let name = opening.to_lowercase().replace('\u{2019}', "'");
    if name.contains("sicilian") {
        "Sicilian Defense"
    } else if name.contains("french") {
        "French Defense"
    } else if name.contains("caro-kann") || name.contains("caro kann") {
        "Caro-Kann Defense"
    } else if name.contains("queen's gambit") || name.contains("queens gambit") {
        "Queen's Gambit"
    } else if name.contains("king's indian") || name.contains("kings indian") {
        "King's Indian Defense"
    } else if name.contains("english") {
        "English Opening"
    } else if name.contains("ruy lopez") || name.contains("spanish") {
        "Ruy Lopez"
    } else {
        "Other"
    }
}

/// Aggregate statistics over several games. Unparsable PGNs are skipped; None when none parse.
pub fn analyze_games<S: AsRef<str>>(pgns: &[S]) -> Option<GamesSummary> {
    let stats: Vec<GameStats> = pgns
        .iter()
        .filter_map(|p| parse_pgn(p.as_ref()))
        .map(|g| game_stats(&g))
        .collect();
    if stats.is_empty() {
        return None;
    }

    let total = stats.len();
    let mut openings: BTreeMap<String, usize> = BTreeMap::new();
    let mut results: BTreeMap<String, usize> =
        RESULT_TOKENS.iter().map(|r| (r.to_string(), 0)).collect();
    for s in &stats {
        *openings.entry(s.opening.clone()).or_default() += 1;
        if let Some(n) = results.get_mut(&s.result) {
            *n += 1;
        }
    }
    let mut most_common: Vec<(String, usize)> = openings.into_iter().collect();
    most_common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    most_common.truncate(5);

    let avg_plies = stats.iter().map(|s| s.total_plies as f64).sum::<f64>() / total as f64;
    let avg_complexity = stats.iter().map(|s| s.tactical_complexity).sum::<f64>() / total as f64;
    let white_wins = results.get("1-0").copied().unwrap_or(0);

    Some(GamesSummary {
        total_games: total,
        average_plies: round_to(avg_plies, 1),
        average_tactical_complexity: round_to(avg_complexity, 3),
        most_common_openings: most_common,
        results_distribution: results,
        white_win_percentage: round_to(white_wins as f64 / total as f64 * 100.0, 1),
    })
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHOLARS_MATE: &str = r#"[Event "Casual Game"]
[Site "London"]
[Date "2024.01.15"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[ECO "C20"]

1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6?? 4. Qxf7# 1-0
"#;

    #[test]
    fn parses_tags_and_mainline() {
        let game = parse_pgn(SCHOLARS_MATE).unwrap();
        assert_eq!(game.header("White"), Some("Alice"));
        assert_eq!(game.header("ECO"), Some("C20"));
        assert_eq!(game.moves, vec!["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]);
        assert_eq!(game.termination.as_deref(), Some("1-0"));
    }

    #[test]
    fn stats_count_captures_and_checks() {
        let stats = game_stats(&parse_pgn(SCHOLARS_MATE).unwrap());
        assert_eq!(stats.total_plies, 7);
        assert_eq!(stats.full_moves, 4);
        assert_eq!(stats.captures, 1);
        assert_eq!(stats.checks, 1);
        assert!((stats.tactical_complexity - 2.0 / 7.0).abs() < 1e-9);
        assert_eq!(stats.game_length, GameLength::Short);
        assert_eq!(stats.result, "1-0");
        assert_eq!(stats.opening, "Unknown");
        assert_eq!(stats.round, "Unknown");
    }

    #[test]
    fn comments_variations_and_nags_are_skipped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3) d6) 2. Nf3 $1 Nc6 ; main line\n3. Bb5 a6 *";
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
        assert!(game.headers.is_empty());
        assert_eq!(game_stats(&game).result, "*");
    }

    #[test]
    fn black_move_numbers_and_castling() {
        let game = parse_pgn("12...O-O 13. O-O-O+ Kh8").unwrap();
        assert_eq!(game.moves, vec!["O-O", "O-O-O+", "Kh8"]);
    }

    #[test]
    fn moves_must_land_on_the_board() {
        for san in ["e4", "exd5", "Nf3", "Qh8+", "e8=Q#", "Raxd1", "O-O-O", "0-0"] {
            assert!(is_san(san), "{} rejected", san);
        }
        for junk in ["e9", "a0", "Ni9", "h", "K", "abc", "e44x9", ""] {
            assert!(!is_san(junk), "{} accepted", junk);
        }
        let game = parse_pgn("1. e4 e9 2. Nf3 Nc6").unwrap();
        assert_eq!(game.moves, vec!["e4", "Nf3", "Nc6"]);
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_pgn("").is_none());
        assert!(parse_pgn("hello there, how are you").is_none());
    }

    #[test]
    fn opening_from_eco_url() {
        let pgn = "[ECOUrl \"https://www.chess.com/openings/Sicilian-Defense-Najdorf-Variation\"]\n\n1. e4 c5 *";
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.opening().as_deref(), Some("Sicilian Defense Najdorf Variation"));
        assert_eq!(opening_family(&game_stats(&game).opening), "Sicilian Defense");
    }

    #[test]
    fn opening_families() {
        assert_eq!(opening_family("Caro-Kann Defense: Advance"), "Caro-Kann Defense");
        assert_eq!(opening_family("Queen's Gambit Declined"), "Queen's Gambit");
        assert_eq!(opening_family("Spanish Game"), "Ruy Lopez");
        assert_eq!(opening_family("Bongcloud Attack"), "Other");
    }

    #[test]
    fn game_length_boundaries() {
        assert_eq!(GameLength::from_plies(39), GameLength::Short);
        assert_eq!(GameLength::from_plies(40), GameLength::Medium);
        assert_eq!(GameLength::from_plies(79), GameLength::Medium);
        assert_eq!(GameLength::from_plies(80), GameLength::Long);
    }

    #[test]
    fn analyze_games_aggregates_and_skips_garbage() {
        let draw = "[Result \"1/2-1/2\"]\n\n1. d4 d5 2. c4 e6 1/2-1/2";
        let summary = analyze_games(&[SCHOLARS_MATE, draw, "not a game"]).unwrap();
        assert_eq!(summary.total_games, 2);
        assert_eq!(summary.results_distribution["1-0"], 1);
        assert_eq!(summary.results_distribution["1/2-1/2"], 1);
        assert_eq!(summary.results_distribution["0-1"], 0);
        assert_eq!(summary.white_win_percentage, 50.0);
        assert_eq!(summary.average_plies, 5.5);
        assert_eq!(summary.most_common_openings, vec![("Unknown".to_string(), 2)]);
        assert!(analyze_games::<&str>(&[]).is_none());
    }
}
