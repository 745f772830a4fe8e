//! Document chunking.
//!
//! [`RecursiveChunker`] splits text on the first separator (in priority order)
//! that occurs in it, recursing into pieces that are still too long with the
//! remaining separators, then merges adjacent pieces back into chunks that
//! approach `chunk_size` while re-including up to `chunk_overlap` characters
//! from the end of the previous chunk.
//!
//! All lengths and offsets are counted in characters, not bytes.

use std::collections::VecDeque;

use tracing::warn;

use crate::config::{DEFAULT_SEPARATORS, RagConfig, validate_chunking};
use crate::document::{Chunk, ChunkMetadata, Document};
use crate::error::Result;

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the indexer.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text hierarchically by a prioritized list of separators.
///
/// The default separators go from paragraphs to lines, words, punctuation and
/// finally single characters, so no chunk exceeds `chunk_size` unless the
/// separator list lacks the empty-string fallback.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(400, 300)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separators.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Create a chunker from the chunking fields of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?
            .with_separators(config.separators.clone()))
    }

    /// Replace the separator list. An empty string matches anywhere and
    /// splits into single characters.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_located(text).into_iter().map(|(_, chunk)| chunk).collect()
    }

    /// Split raw text into chunks paired with the character offset at which
    /// each one starts.
    pub fn split_located(&self, text: &str) -> Vec<(usize, String)> {
        self.split_recursive(text, 0, &self.separators)
    }

    /// `base` is the character offset of `text` within the whole document.
    fn split_recursive(
        &self,
        text: &str,
        base: usize,
        separators: &[String],
    ) -> Vec<(usize, String)> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small: Vec<Piece<'_>> = Vec::new();

        for (offset, piece) in split_keeping_separator(text, separator) {
            let offset = base + offset;
            if char_len(piece) < self.chunk_size {
                small.push((offset, piece));
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge_pieces(&small));
                small.clear();
            }
            if remaining.is_empty() {
                if !piece.trim().is_empty() {
                    chunks.push((offset, piece.to_string()));
                }
            } else {
                chunks.extend(self.split_recursive(piece, offset, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_pieces(&small));
        }

        chunks
    }

    /// Merge adjacent pieces shorter than `chunk_size` into chunks, carrying
    /// up to `chunk_overlap` characters over from one chunk into the next.
    ///
    /// Whitespace-only pieces are never kept at the front of a chunk, so each
    /// chunk starts strictly after the previous one.
    fn merge_pieces(&self, pieces: &[Piece<'_>]) -> Vec<(usize, String)> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<(Piece<'_>, usize)> = VecDeque::new();
        let mut total = 0;

        for &(offset, piece) in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        total,
                        chunk_size = self.chunk_size,
                        "created a chunk longer than chunk_size"
                    );
                }
                if !current.is_empty() {
                    if let Some(chunk) = join_pieces(&current) {
                        chunks.push(chunk);
                    }
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match current.pop_front() {
                            Some((_, front_len)) => total -= front_len,
                            None => break,
                        }
                    }
                    while let Some(((_, front), front_len)) = current.front().copied() {
                        if !front.trim().is_empty() {
                            break;
                        }
                        current.pop_front();
                        total -= front_len;
                    }
                }
            }

            if current.is_empty() && piece.trim().is_empty() {
                continue;
            }
            current.push_back(((offset, piece), len));
            total += len;
        }

        if let Some(chunk) = join_pieces(&current) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_located(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_index, text))| Chunk {
                id: format!("{}#{chunk_index}", document.id),
                text,
                embedding: Vec::new(),
                metadata: ChunkMetadata {
                    source: document.metadata.source.clone(),
                    start_index,
                    chunk_index,
                    extra: document.metadata.extra.clone(),
                },
                document_id: document.id.clone(),
            })
            .collect()
    }
}

/// A slice of the document and its character offset.
type Piece<'a> = (usize, &'a str);

/// Split text at a separator, attaching each separator to the start of the
/// piece that follows it. An empty separator yields single characters.
/// Empty pieces are dropped. Offsets are in characters from the start of `text`.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<Piece<'a>> {
    if separator.is_empty() {
        return text
            .char_indices()
            .enumerate()
            .map(|(n, (i, c))| (n, &text[i..i + c.len_utf8()]))
            .collect();
    }

    let mut slices = Vec::new();
    let mut start = 0;

    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            slices.push(&text[start..pos]);
        }
        start = pos;
    }

    if start < text.len() {
        slices.push(&text[start..]);
    }

    let mut offset = 0;
    slices
        .into_iter()
        .map(|slice| {
            let piece = (offset, slice);
            offset += char_len(slice);
            piece
        })
        .collect()
}

/// Concatenate contiguous pieces and trim, returning the trimmed text with
/// its offset; `None` if nothing but whitespace remains.
fn join_pieces(pieces: &VecDeque<(Piece<'_>, usize)>) -> Option<(usize, String)> {
    let ((first_offset, _), _) = pieces.front().copied()?;
    let joined: String = pieces.iter().map(|((_, piece), _)| *piece).collect();
    let start_trimmed = joined.trim_start();
    let trimmed = start_trimmed.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let leading = char_len(&joined) - char_len(start_trimmed);
    Some((first_offset + leading, trimmed.to_string()))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
