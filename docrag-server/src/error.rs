use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docrag::RagError;
use serde_json::json;
use tracing::{error, warn};

/// Body of the 400 returned when a request carries no usable question.
pub const MISSING_QUESTION: &str = "No 'question' provided";

/// An error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    /// The request body did not contain a string `question`.
    MissingQuestion,
    /// The pipeline failed.
    Rag(RagError),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self::Rag(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingQuestion => StatusCode::BAD_REQUEST,
            Self::Rag(err) => match err {
                RagError::ConfigError(_) => StatusCode::BAD_REQUEST,
                RagError::BackendUnavailable { .. } | RagError::StoreLocked(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                RagError::BackendRejected { .. } => StatusCode::BAD_GATEWAY,
                RagError::SourceNotFound { .. }
                | RagError::EmbeddingMismatch(_)
                | RagError::VectorStoreError(_)
                | RagError::Io { .. }
                | RagError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::MissingQuestion => MISSING_QUESTION.to_string(),
            Self::Rag(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        } else {
            warn!(%status, error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
