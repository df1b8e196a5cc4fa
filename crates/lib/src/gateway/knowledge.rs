//! /api/knowledge routes. Provider keys come from the `x-openai-key`, `x-qdrant-api-key`
//! and `x-qdrant-url` headers, falling back to env and config.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use super::error::ApiError;
use super::protocol::SearchRequest;
use super::server::AppState;
use crate::knowledge::{check_document, DocumentIngestor, Retriever};
use crate::vector::QdrantClient;

const OPENAI_KEY_HEADER: &str = "x-openai-key";
const QDRANT_KEY_HEADER: &str = "x-qdrant-api-key";
const QDRANT_URL_HEADER: &str = "x-qdrant-url";

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Bytes,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn store_for(state: &AppState, headers: &HeaderMap) -> QdrantClient {
    state.qdrant(
        header(headers, QDRANT_URL_HEADER),
        header(headers, QDRANT_KEY_HEADER),
    )
}

/// The multipart field named `file`.
async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("uploaded file has no filename".to_string()))?;
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("reading upload failed: {}", e)))?;
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }
    Err(ApiError::BadRequest(
        "multipart field 'file' is required".to_string(),
    ))
}

/// POST /api/knowledge/upload
pub(super) async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let file = read_file_field(multipart).await?;
    check_document(&file.content_type, &file.filename)?;
    let llm = state.openai(header(&headers, OPENAI_KEY_HEADER))?;
    let store = store_for(&state, &headers);

    store.ensure_collection().await?;
    if store.file_exists(&file.filename).await? {
        log::info!("knowledge: {} already stored, upload skipped", file.filename);
        return Ok((
            StatusCode::OK,
            Json(json!({
                "detail": format!("File '{}' already exists in the knowledge base", file.filename),
                "filename": file.filename,
                "exists": true,
                "message": "Use the overwrite endpoint to replace it",
            })),
        ));
    }

    let result = DocumentIngestor::new(&llm, &store)
        .ingest(&file.filename, &file.content_type, &file.bytes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "detail": "Chess knowledge uploaded successfully",
            "exists": false,
            "result": result,
        })),
    ))
}

/// POST /api/knowledge/files/:filename/overwrite. The upload is stored under the path's filename.
pub(super) async fn overwrite(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let file = read_file_field(multipart).await?;
    check_document(&file.content_type, &filename)?;
    let llm = state.openai(header(&headers, OPENAI_KEY_HEADER))?;
    let store = store_for(&state, &headers);

    store.ensure_collection().await?;
    let chunks_deleted = store.delete_file(&filename).await?;
    let result = DocumentIngestor::new(&llm, &store)
        .ingest(&filename, &file.content_type, &file.bytes)
        .await?;
    Ok(Json(json!({
        "detail": "Chess knowledge file overwritten successfully",
        "chunks_deleted": chunks_deleted,
        "result": result,
    })))
}

/// POST /api/knowledge/search
pub(super) async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let llm = state.openai(header(&headers, OPENAI_KEY_HEADER))?;
    let store = store_for(&state, &headers);
    let results = Retriever::new(&llm, &store)
        .with_expansion(state.config.retrieval.query_expansion)
        .search(query, req.limit.max(1), req.score_threshold)
        .await?;
    Ok(Json(json!({
        "query": query,
        "count": results.len(),
        "results": results,
    })))
}

/// GET /api/knowledge/files
pub(super) async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let files = store_for(&state, &headers).list_files().await?;
    let total_chunks: u64 = files.iter().map(|f| f.chunk_count).sum();
    Ok(Json(json!({
        "total_files": files.len(),
        "total_chunks": total_chunks,
        "files": files,
    })))
}

/// DELETE /api/knowledge/files/:filename
pub(super) async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let deleted = store_for(&state, &headers).delete_file(&filename).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!(
            "File '{}' not found in the knowledge base",
            filename
        )));
    }
    Ok(Json(json!({
        "detail": format!("File '{}' deleted successfully", filename),
        "filename": filename,
        "chunks_deleted": deleted,
    })))
}

/// GET /api/knowledge/stats. Never fails; an unreachable store reports `unavailable`.
pub(super) async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    match store_for(&state, &headers).stats().await {
        Ok(stats) => Json(json!(stats)),
        Err(e) => {
            log::warn!("knowledge: stats unavailable: {}", e);
            Json(json!({ "status": "unavailable", "message": e.to_string() }))
        }
    }
}
