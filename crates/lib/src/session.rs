//! Conversation sessions: the opaque state blob echoed to clients and the server-side store
//! it is merged with on every turn.
//!
//! Merge rules applied by [`SessionStore::resume`]:
//! - a known `session_id` resumes the server copy, whose messages win over the client's;
//! - an unknown or missing id starts a new session (the client id is kept when well-formed),
//!   seeded from the client's messages;
//! - `username` comes from the client when non-empty, else from the server copy;
//! - `last_agent` and `sources` describe a single turn and are cleared.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::knowledge::SourceRef;

/// Unique session identifier (opaque string).
pub type SessionId = String;

const MAX_CLIENT_ID_LEN: usize = 64;

/// A user or assistant turn kept in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// State carried between calls. Missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    /// Agent that produced the latest reply ("greeting", "rag_agent", "chess_agent", "error").
    #[serde(default)]
    pub last_agent: Option<String>,
    /// Knowledge passages used for the latest reply.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    /// Chess.com username remembered from earlier turns.
    #[serde(default)]
    pub username: Option<String>,
}

impl ConversationState {
    /// The remembered username, if non-empty.
    pub fn known_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Client-chosen ids are kept when short and made of `[A-Za-z0-9_-]`.
pub fn is_well_formed_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CLIENT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn new_session_id() -> SessionId {
    format!("sess-{}", uuid::Uuid::new_v4())
}

fn keep_last(messages: &mut Vec<SessionMessage>, limit: usize) {
    if messages.len() > limit {
        let excess = messages.len() - limit;
        messages.drain(..excess);
    }
}

struct Entry {
    state: ConversationState,
    updated: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Entry>,
    tick: u64,
}

/// In-memory session store. Holds at most `max_sessions`; the least recently updated
/// session is evicted first.
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
    max_sessions: usize,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize, history_limit: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            max_sessions: max_sessions.max(1),
            history_limit,
        }
    }

    /// Merge the client's blob with the server copy; the result always has a session id.
    pub async fn resume(&self, client: ConversationState) -> ConversationState {
        let client_username = client.known_username().map(str::to_string);
        let known = match client.session_id.as_deref() {
            Some(id) => self
                .inner
                .read()
                .await
                .sessions
                .get(id)
                .map(|e| e.state.clone()),
            None => None,
        };

        let mut state = match known {
            Some(mut server) => {
                log::debug!("session: resuming {:?}", server.session_id);
                if client_username.is_some() {
                    server.username = client_username;
                }
                server
            }
            None => {
                let id = client
                    .session_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| is_well_formed_id(id))
                    .map(str::to_string)
                    .unwrap_or_else(new_session_id);
                log::debug!("session: starting {}", id);
                let mut messages = client.messages;
                keep_last(&mut messages, self.history_limit);
                ConversationState {
                    session_id: Some(id),
                    messages,
                    last_agent: None,
                    sources: Vec::new(),
                    username: client_username,
                }
            }
        };
        state.last_agent = None;
        state.sources.clear();
        state
    }

    /// Trim history and store the state; returns what was stored.
    pub async fn commit(&self, mut state: ConversationState) -> ConversationState {
        keep_last(&mut state.messages, self.history_limit);
        let id = state
            .session_id
            .get_or_insert_with(new_session_id)
            .clone();
        let mut g = self.inner.write().await;
        g.tick += 1;
        let updated = g.tick;
        g.sessions.insert(
            id,
            Entry {
                state: state.clone(),
                updated,
            },
        );
        while g.sessions.len() > self.max_sessions {
            let oldest = g
                .sessions
                .iter()
                .min_by_key(|(_, e)| e.updated)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    g.sessions.remove(&k);
                    log::debug!("session: evicted {}", k);
                }
                None => break,
            }
        }
        state
    }

    /// Return a clone of the session if it exists.
    pub async fn get(&self, id: &str) -> Option<ConversationState> {
        self.inner
            .read()
            .await
            .sessions
            .get(id)
            .map(|e| e.state.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}
