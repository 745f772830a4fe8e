//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;

/// A storage backend for chunk embeddings with similarity search.
///
/// Scores are relevance values in `[0, 1]` as computed by [`relevance`].
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&chunks).await?;
/// let results = store.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks, replacing any stored chunk with the same id in place.
    /// Chunks must have embeddings set.
    ///
    /// This is the write path for stores that accept incremental writes. The
    /// directory-backed index is never written through it: the indexer
    /// publishes a whole generation, which is loaded with
    /// [`InMemoryVectorStore::from_chunks`](crate::InMemoryVectorStore::from_chunks).
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Search for the `top_k` most relevant chunks to the given embedding.
    ///
    /// Returns results ordered by descending score; equal scores keep
    /// insertion order.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored chunks.
    async fn len(&self) -> usize;

    /// Whether the store holds no chunks.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Relevance of `b` to `a` in `[0, 1]`.
///
/// Both vectors are L2-normalised, and the Euclidean distance `d` between them
/// (which lies in `[0, 2]`) is mapped to `1 - d / sqrt(2)`, then clamped. Equal
/// directions score 1, orthogonal and opposite directions score 0. Returns 0.0
/// if either vector has zero magnitude or the lengths differ.
pub fn relevance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let distance: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x / norm_a - y / norm_b;
            diff * diff
        })
        .sum::<f32>()
        .sqrt();
    (1.0 - distance / std::f32::consts::SQRT_2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_direction_scores_one() {
        let score = relevance(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((score - 1.0).abs() < 1e-6, "{score}");
    }

    #[test]
    fn orthogonal_and_opposite_score_zero() {
        assert!(relevance(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(relevance(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn degenerate_vectors_score_zero() {
        assert_eq!(relevance(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(relevance(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn closer_vectors_score_higher() {
        let query = [1.0, 0.0];
        assert!(relevance(&query, &[0.9, 0.1]) > relevance(&query, &[0.5, 0.5]));
    }
}
