//! System prompts for the supervisor and the two specialist agents, plus the canned replies.
//!
//! Prompts are read from `<config dir>/prompts/{supervisor,knowledge,live_data}.md`; a missing
//! or empty file falls back to the copy bundled in the binary.

use include_dir::{include_dir, Dir};
use std::fs;
use std::path::Path;

pub(crate) static BUNDLED_PROMPTS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/config/prompts");

pub const SUPERVISOR_FILE: &str = "supervisor.md";
pub const KNOWLEDGE_FILE: &str = "knowledge.md";
pub const LIVE_DATA_FILE: &str = "live_data.md";

/// Reply to a bare greeting; no model call is made.
pub const GREETING_REPLY: &str = "Hello! I'm your chess assistant. Ask me about openings, tactics, endgames or strategy, or give me a Chess.com username or a PGN to analyze.";

/// Reply when the knowledge base has nothing relevant.
pub const NO_KNOWLEDGE_REPLY: &str = "I don't have enough information in my knowledge base to answer this chess question. Please try asking about chess openings, tactics, endgames, or strategy.";

/// Prefix of the reply returned when an upstream call fails mid-turn.
pub const APOLOGY_PREFIX: &str = "Sorry, I encountered an error: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub supervisor: String,
    pub knowledge: String,
    pub live_data: String,
}

fn bundled(name: &str) -> String {
    BUNDLED_PROMPTS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn load_one(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    match fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => {
            log::debug!("prompts: loaded {}", path.display());
            s.trim().to_string()
        }
        _ => bundled(name),
    }
}

impl Prompts {
    /// The prompts compiled into the binary.
    pub fn bundled() -> Self {
        Self {
            supervisor: bundled(SUPERVISOR_FILE),
            knowledge: bundled(KNOWLEDGE_FILE),
            live_data: bundled(LIVE_DATA_FILE),
        }
    }

    /// Load from `<config_dir>/prompts/`, file by file, with bundled fallbacks.
    pub fn load(config_dir: &Path) -> Self {
        let dir = config_dir.join("prompts");
        Self {
            supervisor: load_one(&dir, SUPERVISOR_FILE),
            knowledge: load_one(&dir, KNOWLEDGE_FILE),
            live_data: load_one(&dir, LIVE_DATA_FILE),
        }
    }
}
