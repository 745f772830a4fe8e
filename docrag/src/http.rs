//! Shared request plumbing for the HTTP backends.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{RagError, Result};

/// Send `request` and decode a JSON body, mapping failures onto the error taxonomy.
///
/// Connection failures, client timeouts, `429` and `5xx` become
/// [`RagError::BackendUnavailable`]; any other non-success status and bodies
/// that do not decode become [`RagError::BackendRejected`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    backend: &str,
    request: RequestBuilder,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        error!(backend, error = %e, "request failed");
        RagError::unavailable(backend, format!("request failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        error!(backend, %status, "API error");
        let message = format!("API returned {status}: {detail}");
        return Err(if is_transient(status) {
            RagError::unavailable(backend, message)
        } else {
            RagError::rejected(backend, message)
        });
    }

    response.json::<T>().await.map_err(|e| {
        error!(backend, error = %e, "failed to parse response");
        RagError::rejected(backend, format!("failed to parse response: {e}"))
    })
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Pull a readable message out of an error body.
///
/// Ollama answers `{"error": "..."}`, OpenAI-compatible servers answer
/// `{"error": {"message": "..."}}`; anything else is returned verbatim.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    match value.get("error") {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(detail) => detail
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| detail.to_string()),
        None => body.trim().to_string(),
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
        assert!(!is_transient(StatusCode::NOT_FOUND));
    }

    #[test]
    fn error_detail_understands_both_shapes() {
        assert_eq!(error_detail(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_detail(r#"{"error":{"message":"bad key","type":"auth"}}"#), "bad key");
        assert_eq!(error_detail("  gateway exploded "), "gateway exploded");
    }

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/embed"),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            endpoint("https://api.openai.com/v1", "embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }
}
