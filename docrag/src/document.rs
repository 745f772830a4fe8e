//! Data types for documents, chunks, and search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Metadata carried by a [`Document`].
///
/// `source` is required; anything else goes into the open `extra` map, which
/// is serialized flattened next to `source`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocumentMetadata {
    /// Where the document came from (file path or URI).
    pub source: String,
    /// Optional additional fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl DocumentMetadata {
    /// Create metadata with the given source and no extra fields.
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), extra: BTreeMap::new() }
    }

    /// Add an extra field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document, stable across loads.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Metadata associated with the document.
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document, validating its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the id or `source` is empty.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: DocumentMetadata,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RagError::ConfigError("document id must not be empty".to_string()));
        }
        if metadata.source.trim().is_empty() {
            return Err(RagError::ConfigError(format!(
                "document '{id}' has an empty 'source' metadata field"
            )));
        }
        Ok(Self { id, text: text.into(), metadata })
    }
}

/// Metadata carried by a [`Chunk`]: the parent's fields plus chunk position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Inherited from the parent document.
    pub source: String,
    /// Character offset of the chunk within the parent document's text.
    pub start_index: usize,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Inherited optional fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// A segment of a [`Document`] with its vector embedding.
///
/// Chunkers produce chunks with an empty `embedding`; the indexer attaches it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk: `{document_id}#{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
    /// Position and provenance of the chunk.
    pub metadata: ChunkMetadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// The `source` of the document this chunk came from.
    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Relevance in `[0, 1]`; higher is more relevant.
    pub score: f32,
}
