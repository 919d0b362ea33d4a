use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The five error kinds the pipeline ever surfaces. Every public operation
/// returns a structured result built from these rather than propagating a
/// raw exception.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Embedded database error: {0}")]
    Embedded(#[from] libsql::Error),

    #[error("Networked database error: {0}")]
    Networked(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Component tag used in log lines and in the `{success:false, error}`
    /// envelope the tool dispatcher returns. Never exposes internals.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::BackendUnavailable(_)
            | PipelineError::Embedded(_)
            | PipelineError::Networked(_) => "BackendUnavailable",
            PipelineError::Llm(_) | PipelineError::LlmUnavailable(_) | PipelineError::LlmRateLimit { .. } => {
                "LLMError"
            }
            PipelineError::Data(_) | PipelineError::Json(_) => "DataError",
            PipelineError::Internal(_) | PipelineError::Http(_) | PipelineError::Io(_) => "InternalError",
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::BackendUnavailable(_) | PipelineError::Embedded(_) | PipelineError::Networked(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Llm(_) => StatusCode::BAD_GATEWAY,
            PipelineError::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::LlmRateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::Data(_) | PipelineError::Json(_) => StatusCode::BAD_REQUEST,
            PipelineError::Internal(_) | PipelineError::Http(_) | PipelineError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "error_kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
