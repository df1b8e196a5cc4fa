//! Qdrant REST API client (http://localhost:6333 by default).
//! Points carry the chunk text and file metadata in their payload; files are grouped by `filename`.

use crate::config::QdrantSettings;
use crate::vector::{Passage, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const SCROLL_PAGE: usize = 100;

/// Client for one Qdrant collection.
#[derive(Clone)]
pub struct QdrantClient {
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: usize,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum QdrantError {
    #[error("qdrant request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("qdrant api error: {0}")]
    Api(String),
}

/// A point to upsert: id, embedding, payload.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One uploaded file as seen through its stored chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeFile {
    pub filename: String,
    pub content_type: String,
    pub total_chunks: u64,
    pub file_hash: String,
    pub chunk_count: u64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection_name: String,
    pub total_documents: u64,
    pub vector_size: u64,
    pub distance_metric: String,
    pub status: String,
}

impl QdrantClient {
    pub fn new(client: reqwest::Client, settings: &QdrantSettings) -> Self {
        Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            collection: settings.collection.clone(),
            vector_size: settings.vector_size,
            client,
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send and decode `{"result": ...}`; non-2xx becomes `QdrantError::Api`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, QdrantError> {
        let res = builder.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QdrantError::Api(format!("{} {}", status, body)));
        }
        let data: QdrantResponse = res.json().await?;
        Ok(data.result)
    }

    /// GET /collections/{name}; create it (cosine distance) when it does not exist.
    pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
        let url = self.collection_url("");
        let res = self.request(reqwest::Method::GET, &url).send().await?;
        if res.status().is_success() {
            return Ok(());
        }
        if res.status() != reqwest::StatusCode::NOT_FOUND {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QdrantError::Api(format!("{} {}", status, body)));
        }
        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        self.send(self.request(reqwest::Method::PUT, &url).json(&body))
            .await?;
        log::info!("qdrant: created collection {}", self.collection);
        Ok(())
    }

    /// PUT /collections/{name}/points?wait=true
    pub async fn upsert(&self, points: Vec<Point>) -> Result<(), QdrantError> {
        if points.is_empty() {
            return Ok(());
        }
        let url = self.collection_url("/points?wait=true");
        self.send(
            self.request(reqwest::Method::PUT, &url)
                .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    /// POST /collections/{name}/points/scroll: one page of points, optionally filtered.
    async fn scroll_page(
        &self,
        filter: Option<&Value>,
        offset: Option<Value>,
        with_payload: bool,
    ) -> Result<(Vec<ScrolledPoint>, Option<Value>), QdrantError> {
        let url = self.collection_url("/points/scroll");
        let mut body = json!({
            "limit": SCROLL_PAGE,
            "with_payload": with_payload,
            "with_vector": false,
        });
        if let Some(f) = filter {
            body["filter"] = f.clone();
        }
        if let Some(o) = offset {
            body["offset"] = o;
        }
        let result = self
            .send(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        let page: ScrollResult = serde_json::from_value(result)
            .map_err(|e| QdrantError::Api(format!("invalid scroll result: {}", e)))?;
        let next = page.next_page_offset.filter(|v| !v.is_null());
        Ok((page.points, next))
    }

    /// True when at least one chunk with this filename is stored.
    pub async fn file_exists(&self, filename: &str) -> Result<bool, QdrantError> {
        let filter = filename_filter(filename);
        let (points, _) = self.scroll_page(Some(&filter), None, false).await?;
        Ok(!points.is_empty())
    }

    /// Scroll the whole collection and group chunks by filename.
    pub async fn list_files(&self) -> Result<Vec<KnowledgeFile>, QdrantError> {
        let mut files: BTreeMap<String, KnowledgeFile> = BTreeMap::new();
        let mut offset = None;
        loop {
            let (points, next) = self.scroll_page(None, offset, true).await?;
            for point in &points {
                let filename = payload_str(&point.payload, "filename", "unknown");
                let entry = files
                    .entry(filename.clone())
                    .or_insert_with(|| KnowledgeFile {
                        filename,
                        content_type: payload_str(&point.payload, "content_type", "unknown"),
                        total_chunks: payload_u64(&point.payload, "total_chunks"),
                        file_hash: payload_str(&point.payload, "file_hash", ""),
                        chunk_count: 0,
                        source: payload_str(&point.payload, "source", "uploaded_document"),
                    });
                entry.chunk_count += 1;
            }
            match next {
                Some(n) if !points.is_empty() => offset = Some(n),
                _ => break,
            }
        }
        Ok(files.into_values().collect())
    }

    /// Delete every chunk of a file; returns how many were removed (0 when the file is unknown).
    pub async fn delete_file(&self, filename: &str) -> Result<usize, QdrantError> {
        let filter = filename_filter(filename);
        let mut ids: Vec<Value> = Vec::new();
        let mut offset = None;
        loop {
            let (points, next) = self.scroll_page(Some(&filter), offset, false).await?;
            ids.extend(points.iter().map(|p| p.id.clone()));
            match next {
                Some(n) if !points.is_empty() => offset = Some(n),
                _ => break,
            }
        }
        if ids.is_empty() {
            return Ok(0);
        }
        let url = self.collection_url("/points/delete?wait=true");
        self.send(
            self.request(reqwest::Method::POST, &url)
                .json(&json!({ "points": ids })),
        )
        .await?;
        log::info!("qdrant: deleted {} chunk(s) for {}", ids.len(), filename);
        Ok(ids.len())
    }

    /// GET /collections/{name}: point count and vector parameters.
    pub async fn stats(&self) -> Result<CollectionStats, QdrantError> {
        let url = self.collection_url("");
        let result = self.send(self.request(reqwest::Method::GET, &url)).await?;
        let vectors = &result["config"]["params"]["vectors"];
        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            total_documents: result["points_count"].as_u64().unwrap_or(0),
            vector_size: vectors["size"].as_u64().unwrap_or(0),
            distance_metric: vectors["distance"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            status: "healthy".to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantClient {
    /// POST /collections/{name}/points/search. A missing collection has no passages.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<Passage>, QdrantError> {
        let url = self.collection_url("/points/search");
        let body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        let res = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            log::info!("qdrant: collection {} does not exist yet, no passages", self.collection);
            return Ok(Vec::new());
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QdrantError::Api(format!("{} {}", status, body)));
        }
        let result = res.json::<QdrantResponse>().await?.result;
        let hits: Vec<ScoredPoint> = serde_json::from_value(result)
            .map_err(|e| QdrantError::Api(format!("invalid search result: {}", e)))?;
        Ok(hits.into_iter().filter_map(scored_to_passage).collect())
    }
}

fn filename_filter(filename: &str) -> Value {
    json!({ "must": [ { "key": "filename", "match": { "value": filename } } ] })
}

fn payload_str(payload: &Value, key: &str, default: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

fn payload_u64(payload: &Value, key: &str) -> u64 {
    payload.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Hits without a `content` payload are skipped.
fn scored_to_passage(hit: ScoredPoint) -> Option<Passage> {
    let content = hit.payload.get("content")?.as_str()?.to_string();
    Some(Passage {
        content,
        filename: payload_str(&hit.payload, "filename", "unknown"),
        chunk_index: payload_u64(&hit.payload, "chunk_index"),
        score: hit.score,
        source: payload_str(&hit.payload, "source", "unknown"),
        content_type: payload_str(&hit.payload, "content_type", "unknown"),
        search_query: None,
    })
}

#[derive(Debug, Deserialize)]
struct QdrantResponse {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: Value,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<ScrolledPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_without_content_is_skipped() {
        let hit: ScoredPoint =
            serde_json::from_value(json!({"id": 1, "score": 0.9, "payload": {"filename": "a.txt"}}))
                .unwrap();
        assert!(scored_to_passage(hit).is_none());
    }

    #[test]
    fn hit_payload_maps_to_passage() {
        let hit: ScoredPoint = serde_json::from_value(json!({
            "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26",
            "score": 0.82,
            "payload": {
                "content": "The Lucena position is a won rook endgame.",
                "filename": "endgames.txt",
                "chunk_index": 3,
                "source": "uploaded_document",
                "content_type": "chess_knowledge"
            }
        }))
        .unwrap();
        let p = scored_to_passage(hit).unwrap();
        assert_eq!(p.filename, "endgames.txt");
        assert_eq!(p.chunk_index, 3);
        assert!((p.score - 0.82).abs() < f32::EPSILON);
        assert_eq!(p.search_query, None);
    }

    #[test]
    fn null_next_offset_ends_scroll() {
        let page: ScrollResult =
            serde_json::from_value(json!({"points": [], "next_page_offset": null})).unwrap();
        assert!(page.next_page_offset.filter(|v| !v.is_null()).is_none());
    }
}
