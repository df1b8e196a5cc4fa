//! Gateway HTTP server: chat and analysis endpoints, knowledge routes, health.

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::error::ApiError;
use super::knowledge;
use super::protocol::{AnalysisResponse, ChatRequest, PgnRequest, PlayerRequest, RecentGamesRequest};
use crate::agent::{AssistantReply, ChessAssistant};
use crate::chess::{self, pgn, ChessComClient};
use crate::config::{self, Config};
use crate::llm::OpenAiClient;
use crate::prompts::Prompts;
use crate::routing::{AgentTag, Route};
use crate::session::{ConversationState, SessionStore};
use crate::tools::ChessTools;
use crate::vector::QdrantClient;

const MISSING_OPENAI_KEY: &str =
    "OpenAI API key is required: send openai_key or set OPENAI_API_KEY";
const MAX_RECENT_GAMES: u32 = 50;

/// Shared by every handler. Provider clients are built per request from these parts.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub prompts: Arc<Prompts>,
    pub sessions: Arc<SessionStore>,
    pub http: reqwest::Client,
    pub chess_tools: ChessTools,
}

impl AppState {
    pub fn new(config: Config, prompts: Prompts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        let chess_tools = ChessTools::new(ChessComClient::new(http.clone(), &config.chess_com));
        let sessions = SessionStore::new(config.sessions.max_sessions, config.sessions.history_limit);
        Ok(Self {
            config: Arc::new(config),
            prompts: Arc::new(prompts),
            sessions: Arc::new(sessions),
            http,
            chess_tools,
        })
    }

    /// OpenAI client for the key sent with the request, else the env/config key.
    pub(crate) fn openai(&self, request_key: Option<&str>) -> Result<OpenAiClient, ApiError> {
        let key = config::resolve_openai_key(&self.config, request_key)
            .ok_or_else(|| ApiError::BadRequest(MISSING_OPENAI_KEY.to_string()))?;
        let llm = &self.config.llm;
        Ok(OpenAiClient::new(
            self.http.clone(),
            &llm.base_url,
            key,
            llm.chat_model.clone(),
            llm.embedding_model.clone(),
            llm.temperature,
        ))
    }

    pub(crate) fn qdrant(&self, url: Option<&str>, api_key: Option<&str>) -> QdrantClient {
        let settings = config::resolve_qdrant(&self.config, url, api_key);
        QdrantClient::new(self.http.clone(), &settings)
    }

    fn assistant<'a>(&'a self, llm: &'a OpenAiClient, store: &'a QdrantClient) -> ChessAssistant<'a> {
        ChessAssistant::new(
            llm,
            store,
            &self.chess_tools,
            &self.prompts,
            &self.config.retrieval,
            &self.config.agents,
        )
    }

    /// One live-data turn outside any session. A failed turn is a 500 carrying the apology.
    async fn live_data_turn(
        &self,
        llm: &OpenAiClient,
        query: &str,
        username: Option<&str>,
    ) -> Result<AssistantReply, ApiError> {
        let store = self.qdrant(None, None);
        let state = ConversationState {
            username: username.map(str::to_string),
            ..Default::default()
        };
        let reply = self
            .assistant(llm, &store)
            .process_routed(query, state, Route::LiveData)
            .await;
        if reply.agent_used == AgentTag::Error {
            return Err(ApiError::Internal(reply.response));
        }
        Ok(reply)
    }
}

/// The client's state blob; anything unreadable starts a fresh conversation.
fn parse_state(blob: Option<serde_json::Value>) -> ConversationState {
    match blob {
        None | Some(serde_json::Value::Null) => ConversationState::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            log::warn!("gateway: ignoring malformed conversation state: {}", e);
            ConversationState::default()
        }),
    }
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

pub fn router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_bytes;
    Router::new()
        .route("/", get(health_http))
        .route("/health", get(health))
        .route("/analyze/health", get(analyze_health))
        .route("/analyze/chat", post(chat))
        .route("/analyze/player", post(analyze_player))
        .route("/analyze/pgn", post(analyze_pgn))
        .route("/analyze/recent", post(analyze_recent))
        .route("/api/knowledge/upload", post(knowledge::upload))
        .route("/api/knowledge/search", post(knowledge::search))
        .route("/api/knowledge/files", get(knowledge::list_files))
        .route("/api/knowledge/files/:filename", delete(knowledge::delete_file))
        .route(
            "/api/knowledge/files/:filename/overwrite",
            post(knowledge::overwrite),
        )
        .route("/api/knowledge/stats", get(knowledge::stats))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Load prompts from the config directory, bind and serve until SIGINT/SIGTERM.
pub async fn run_server(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to {} exposes the API without authentication; keep it behind a trusted proxy",
            bind
        );
    }
    let prompts = Prompts::load(&config::config_dir(&config_path));
    let port = config.server.port;
    let state = AppState::new(config, prompts)?;
    log_startup(&state.config, &config_path);
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

fn log_startup(config: &Config, config_path: &Path) {
    log::info!("config: {}", config_path.display());
    log::info!(
        "llm: {} (chat {}, embeddings {})",
        config.llm.base_url,
        config.llm.chat_model,
        config.llm.embedding_model
    );
    log::info!(
        "vector store: {} (collection {})",
        config.vector_store.url,
        config.vector_store.collection
    );
    if config::resolve_openai_key(config, None).is_none() {
        log::info!("no server-side OpenAI key; clients must send their own");
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns runtime status (for health checks and the CLI).
async fn health_http(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.server.port,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn analyze_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "chess-analysis" }))
}

/// POST /analyze/chat: one conversational turn through the supervisor.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<AssistantReply>, ApiError> {
    let message = required(&req.message, "message")?;
    let llm = state.openai(req.openai_key.as_deref())?;
    let store = state.qdrant(req.qdrant_url.as_deref(), req.qdrant_api_key.as_deref());

    let resumed = state.sessions.resume(parse_state(req.state)).await;
    let mut reply = state.assistant(&llm, &store).process_query(&message, resumed).await;
    reply.conversation_state = state.sessions.commit(reply.conversation_state).await;
    log::info!(
        "chat: session {} answered by {}",
        reply.conversation_state.session_id.as_deref().unwrap_or("-"),
        reply.agent_used
    );
    Ok(Json(reply))
}

fn chess_username(value: &str) -> Result<String, ApiError> {
    let username = required(value, "username")?;
    if !chess::is_valid_username(&username) {
        return Err(ApiError::BadRequest(format!(
            "Invalid Chess.com username: {}",
            username
        )));
    }
    Ok(username)
}

async fn analyze_player(
    State(state): State<AppState>,
    Json(req): Json<PlayerRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let username = chess_username(&req.username)?;
    let llm = state.openai(req.openai_key.as_deref())?;
    let query = format!(
        "Analyze the Chess.com player '{}'. Look up their ratings with get_player_stats and their \
         recent results with get_recent_games, then give insights into their strengths, \
         weaknesses and how to improve.",
        username
    );
    let reply = state.live_data_turn(&llm, &query, Some(&username)).await?;
    Ok(Json(AnalysisResponse {
        analysis: reply.response,
        player_data: Some(json!({ "username": username })),
        game_data: None,
    }))
}

async fn analyze_pgn(
    State(state): State<AppState>,
    Json(req): Json<PgnRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let content = required(&req.pgn_content, "pgn_content")?;
    let game = pgn::parse_pgn(&content)
        .ok_or_else(|| ApiError::BadRequest("invalid PGN: no tags or moves found".to_string()))?;
    let stats = pgn::game_stats(&game);
    let llm = state.openai(req.openai_key.as_deref())?;
    let query = format!(
        "Analyze this chess game in PGN format with analyze_pgn. Comment on the opening, the \
         key moments and what each side could have done better.\n\n{}",
        content
    );
    let reply = state.live_data_turn(&llm, &query, None).await?;
    Ok(Json(AnalysisResponse {
        analysis: reply.response,
        player_data: None,
        game_data: Some(json!({
            "pgn_provided": true,
            "headers": game.headers,
            "stats": stats,
        })),
    }))
}

async fn analyze_recent(
    State(state): State<AppState>,
    Json(req): Json<RecentGamesRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let username = chess_username(&req.username)?;
    if req.num_games == 0 || req.num_games > MAX_RECENT_GAMES {
        return Err(ApiError::BadRequest(format!(
            "num_games must be between 1 and {}",
            MAX_RECENT_GAMES
        )));
    }
    let llm = state.openai(req.openai_key.as_deref())?;
    let query = format!(
        "Get the {} most recent games of the Chess.com player '{}' with get_recent_games and \
         analyze them: results, time controls, rating trend and patterns worth working on.",
        req.num_games, username
    );
    let reply = state.live_data_turn(&llm, &query, Some(&username)).await?;
    Ok(Json(AnalysisResponse {
        analysis: reply.response,
        player_data: Some(json!({ "username": username, "num_games": req.num_games })),
        game_data: None,
    }))
}
