//! `docrag-server` answers questions over a docrag index through a single
//! `POST /ask` endpoint.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, ServerConfig, app_router, run_server};
