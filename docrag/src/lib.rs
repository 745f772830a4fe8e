//! Retrieval-augmented question answering over a local directory of documents.
//!
//! This crate provides:
//! - Recursive, overlap-aware text chunking with character offsets
//! - Markdown (or any extension) document loading
//! - Ollama and OpenAI-compatible embedding and generation backends
//! - Index builds published atomically to a directory-backed store
//! - Thresholded similarity retrieval and prompt composition
//! - [`RagService`], the query-time context shared by the CLI and HTTP server

pub mod chunking;
pub mod composer;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
mod http;
pub mod indexer;
pub mod inmemory;
pub mod loader;
pub mod ollama;
pub mod openai;
pub mod persist;
pub mod retriever;
pub mod retry;
pub mod service;
pub mod settings;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker};
pub use composer::{Answer, AnswerComposer, PromptTemplate, build_context, strip_reasoning};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, ChunkMetadata, Document, DocumentMetadata, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::GenerationProvider;
pub use indexer::{IndexReport, Indexer, IndexerBuilder};
pub use inmemory::InMemoryVectorStore;
pub use loader::DocumentLoader;
pub use ollama::{OllamaEmbeddingProvider, OllamaGenerator};
pub use openai::{OpenAIEmbeddingProvider, OpenAIGenerator};
pub use persist::{StoreDir, StoreManifest};
pub use retriever::{Retrieval, Retriever};
pub use retry::RetryPolicy;
pub use service::{AskOutcome, RagService, RagServiceBuilder};
pub use settings::{BackendKind, Settings};
pub use vectorstore::{VectorStore, relevance};
