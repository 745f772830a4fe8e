//! Error types for the `docrag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while indexing documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration or request validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The document source is missing, is not a directory, or holds no documents.
    #[error("Document source not found at {path}: {reason}")]
    SourceNotFound {
        /// The document root that was searched.
        path: PathBuf,
        /// Why the source was rejected.
        reason: String,
    },

    /// An embedding or generation backend could not be reached or is overloaded.
    ///
    /// Callers may retry these.
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// The backend that failed.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A backend refused the request or returned a response that cannot be used.
    #[error("Backend rejected request ({backend}): {message}")]
    BackendRejected {
        /// The backend that rejected the request.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A backend call did not finish in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// Vectors do not match the embedding model or dimensions the store was built with.
    #[error("Embedding mismatch: {0}")]
    EmbeddingMismatch(String),

    /// The persisted vector store is unreadable or inconsistent.
    #[error("Vector store error: {0}")]
    VectorStoreError(String),

    /// Another index build holds the lock on the store location.
    #[error("Store at {} is locked by another build", .0.display())]
    StoreLocked(PathBuf),

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Build an [`RagError::Io`] with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Build a [`RagError::BackendUnavailable`].
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable { backend: backend.into(), message: message.into() }
    }

    /// Build a [`RagError::BackendRejected`].
    pub fn rejected(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendRejected { backend: backend.into(), message: message.into() }
    }

    /// Whether the failure is transient and the operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Timeout { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
