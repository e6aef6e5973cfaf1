use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ragchat_orchestrator::TurnError;
use ragchat_persist::PersistError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing caller identity")]
    Unauthorized,

    #[error("Caller does not own this thread")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Validation(msg) => Self::BadRequest(msg),
            TurnError::NotFound(id) => Self::NotFound(format!("thread {}", id)),
            TurnError::Forbidden => Self::Forbidden,
            TurnError::Retrieval(_) | TurnError::Generation { .. } => Self::Upstream(err.to_string()),
            TurnError::Store(e) => Self::Persist(e),
            TurnError::Persistence { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Upstream(ref msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
            ApiError::Persist(ref e) if e.is_retryable() => {
                tracing::warn!("Store unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage temporarily unavailable".to_string())
            }
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ApiError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
