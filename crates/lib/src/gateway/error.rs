//! HTTP error type rendered as `{"detail": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::knowledge::KnowledgeError;
use crate::vector::QdrantError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("gateway: {} {}", status.as_u16(), self);
        } else {
            log::debug!("gateway: {} {}", status.as_u16(), self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<QdrantError> for ApiError {
    fn from(e: QdrantError) -> Self {
        match e {
            QdrantError::Request(e) => {
                ApiError::ServiceUnavailable(format!("vector store unavailable: {}", e))
            }
            QdrantError::Api(msg) => ApiError::Internal(format!("vector store error: {}", msg)),
        }
    }
}

impl From<KnowledgeError> for ApiError {
    fn from(e: KnowledgeError) -> Self {
        match e {
            KnowledgeError::UnsupportedType(_) | KnowledgeError::InvalidDocument(_) => {
                ApiError::BadRequest(e.to_string())
            }
            KnowledgeError::Store(e) => e.into(),
            KnowledgeError::Llm(e) => ApiError::Internal(format!("embedding failed: {}", e)),
        }
    }
}
