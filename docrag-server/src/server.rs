use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use docrag::{AskOutcome, RagService, Settings};
use serde_json::{Value, json};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::error::ApiError;

/// Answer returned when no stored chunk is relevant enough.
pub const NO_MATCH_ANSWER: &str = "No matching results found";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
}

impl AppState {
    pub fn new(service: RagService) -> Self {
        Self { service: Arc::new(service) }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000 }
    }
}

impl From<&Settings> for ServerConfig {
    fn from(settings: &Settings) -> Self {
        Self { host: settings.host.clone(), port: settings.port }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Open the index described by `settings` and serve it until Ctrl-C.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let config = ServerConfig::from(&settings);
    let service = RagService::open(&settings).await.context("failed to open the index")?;
    let state = AppState::new(service);
    let app = app_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid host/port {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("docrag listening on http://{}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Ok(service) = Arc::try_unwrap(state.service) {
        service.close();
    }
    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// `POST /ask` with `{"question": "..."}`.
///
/// The body is parsed by hand so that every malformed request gets the same
/// 400 rather than axum's extractor rejections.
async fn ask(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let question = extract_question(&body).ok_or(ApiError::MissingQuestion)?;

    match state.service.ask(&question).await? {
        AskOutcome::NoMatch => Ok(Json(json!({ "answer": NO_MATCH_ANSWER }))),
        AskOutcome::Answered(answer) => {
            info!(sources = answer.sources.len(), "answered question");
            Ok(Json(json!({ "answer": answer.text })))
        }
    }
}

fn extract_question(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("question")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_extraction_is_strict_about_shape() {
        assert_eq!(extract_question(br#"{"question": "why?"}"#).as_deref(), Some("why?"));
        assert_eq!(extract_question(br#"{"question": ""}"#).as_deref(), Some(""));
        assert_eq!(extract_question(b"{}"), None);
        assert_eq!(extract_question(br#"{"question": 42}"#), None);
        assert_eq!(extract_question(br#"["question"]"#), None);
        assert_eq!(extract_question(b"not json"), None);
        assert_eq!(extract_question(b""), None);
    }
}
