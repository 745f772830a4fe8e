//! Directory-backed persistence for built indexes.
//!
//! A store location holds any number of generation directories and a
//! `CURRENT` file naming the live one:
//!
//! ```text
//! <store>/CURRENT              gen-<uuid>
//! <store>/gen-<uuid>/manifest.json
//! <store>/gen-<uuid>/entries.json
//! <store>/.build.lock          present while a build runs
//! ```
//!
//! A build writes a complete new generation, then replaces `CURRENT` with a
//! rename. Readers therefore see either the old generation or the new one.
//! The generation a build replaces is kept until the next build, and a reader
//! whose generation disappears under it starts over from `CURRENT`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Chunk;
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;

/// Current on-disk format.
pub const FORMAT_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";
const LOCK_FILE: &str = ".build.lock";
const GENERATION_PREFIX: &str = "gen-";

/// How many times [`StoreDir::load`] follows `CURRENT` before giving up.
const LOAD_ATTEMPTS: usize = 5;

/// Describes one generation: what built it and what it holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreManifest {
    pub format_version: u32,
    pub generation: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub documents: usize,
    pub chunks: usize,
    pub created_at: DateTime<Utc>,
}

impl StoreManifest {
    /// Fail with [`RagError::EmbeddingMismatch`] unless this generation was
    /// built with `embedding_model` producing `dimensions`-long vectors.
    pub fn check_embedder(&self, embedding_model: &str, dimensions: usize) -> Result<()> {
        if self.embedding_model != embedding_model {
            return Err(RagError::EmbeddingMismatch(format!(
                "store was built with '{}' but the configured embedder is '{embedding_model}'",
                self.embedding_model
            )));
        }
        if self.dimensions != dimensions {
            return Err(RagError::EmbeddingMismatch(format!(
                "store holds {}-dimensional vectors but the embedder produces {dimensions}",
                self.dimensions
            )));
        }
        Ok(())
    }
}

/// A store location on disk.
#[derive(Debug, Clone)]
pub struct StoreDir {
    root: PathBuf,
}

impl StoreDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the live generation, or `None` if nothing was ever published.
    pub async fn current(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let name = contents.trim();
                if !is_generation_name(name) {
                    return Err(RagError::VectorStoreError(format!(
                        "{} does not name a generation: {name:?}",
                        path.display()
                    )));
                }
                Ok(Some(name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RagError::io(path, e)),
        }
    }

    /// Read the manifest and entries of the live generation.
    ///
    /// If a concurrent build prunes the generation between reading `CURRENT`
    /// and reading its files, the pointer is read again, up to a fixed number
    /// of attempts.
    pub async fn load(&self) -> Result<Option<(StoreManifest, Vec<Chunk>)>> {
        let mut attempt = 1;
        loop {
            let Some(generation) = self.current().await? else {
                return Ok(None);
            };
            match self.load_generation(&generation).await {
                Err(e) if attempt < LOAD_ATTEMPTS && is_not_found(&e) => {
                    debug!(
                        generation = %generation,
                        attempt,
                        "generation pruned while loading, rereading CURRENT"
                    );
                    attempt += 1;
                }
                result => return result.map(Some),
            }
        }
    }

    async fn load_generation(&self, generation: &str) -> Result<(StoreManifest, Vec<Chunk>)> {
        let dir = self.root.join(generation);

        let manifest: StoreManifest = read_json(&dir.join(MANIFEST_FILE)).await?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::VectorStoreError(format!(
                "unsupported store format version {} (expected {FORMAT_VERSION})",
                manifest.format_version
            )));
        }
        if manifest.generation != generation {
            return Err(RagError::VectorStoreError(format!(
                "manifest in {generation} claims generation {}",
                manifest.generation
            )));
        }

        let chunks: Vec<Chunk> = read_json(&dir.join(ENTRIES_FILE)).await?;
        if chunks.len() != manifest.chunks {
            return Err(RagError::VectorStoreError(format!(
                "manifest lists {} chunks but {} were stored",
                manifest.chunks,
                chunks.len()
            )));
        }
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != manifest.dimensions) {
            return Err(RagError::VectorStoreError(format!(
                "chunk '{}' has {} dimensions, manifest says {}",
                bad.id,
                bad.embedding.len(),
                manifest.dimensions
            )));
        }

        Ok((manifest, chunks))
    }

    /// Open the live generation for searching.
    ///
    /// A location with nothing published yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingMismatch`] if the generation was built by a
    /// different embedder, and [`RagError::VectorStoreError`] if it is corrupt.
    pub async fn open(
        &self,
        embedding_model: &str,
        dimensions: usize,
    ) -> Result<(Option<StoreManifest>, InMemoryVectorStore)> {
        match self.load().await? {
            Some((manifest, chunks)) => {
                manifest.check_embedder(embedding_model, dimensions)?;
                info!(
                    store = %self.root.display(),
                    generation = %manifest.generation,
                    chunks = manifest.chunks,
                    "opened vector store"
                );
                let store = InMemoryVectorStore::from_chunks(chunks)?;
                Ok((Some(manifest), store))
            }
            None => {
                info!(store = %self.root.display(), "no index published yet, starting empty");
                Ok((None, InMemoryVectorStore::new()))
            }
        }
    }

    /// Take the exclusive build lock for this location.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreLocked`] if another build holds it.
    pub async fn lock(&self) -> Result<BuildLock> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| RagError::io(&self.root, e))?;
        let path = self.root.join(LOCK_FILE);
        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(_) => {
                debug!(lock = %path.display(), "acquired build lock");
                Ok(BuildLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RagError::StoreLocked(self.root.clone()))
            }
            Err(e) => Err(RagError::io(path, e)),
        }
    }

    /// Write a complete generation directory without publishing it.
    pub(crate) async fn write_generation(
        &self,
        manifest: &StoreManifest,
        chunks: &[Chunk],
    ) -> Result<PathBuf> {
        let dir = self.root.join(&manifest.generation);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| RagError::io(&dir, e))?;
        write_json(&dir.join(ENTRIES_FILE), chunks).await?;
        // Manifest last: a generation without one is incomplete.
        write_json(&dir.join(MANIFEST_FILE), manifest).await?;
        Ok(dir)
    }

    /// Point `CURRENT` at `generation` with an atomic rename.
    pub(crate) async fn publish(&self, generation: &str) -> Result<()> {
        let staging = self.root.join(format!(".{CURRENT_FILE}.{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, generation).await.map_err(|e| RagError::io(&staging, e))?;
        let target = self.root.join(CURRENT_FILE);
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(RagError::io(target, e));
        }
        Ok(())
    }

    /// Delete every generation directory except `live` and the one it
    /// `replaced`, which readers that started before the flip may still be
    /// reading.
    ///
    /// Failures are logged, not returned: the published index is already intact.
    pub(crate) async fn prune(&self, live: &str, replaced: Option<&str>) {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(store = %self.root.display(), error = %e, "could not list old generations");
                return;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        store = %self.root.display(),
                        error = %e,
                        "could not list old generations"
                    );
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == live || Some(name.as_str()) == replaced || !is_generation_name(&name) {
                continue;
            }
            self.discard(&name).await;
        }
    }

    /// Remove one generation directory, logging on failure.
    pub(crate) async fn discard(&self, generation: &str) {
        let dir = self.root.join(generation);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(generation, "removed generation"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove generation"),
        }
    }
}

/// A fresh, unused generation name.
pub(crate) fn new_generation_name() -> String {
    format!("{GENERATION_PREFIX}{}", uuid::Uuid::new_v4())
}

fn is_not_found(error: &RagError) -> bool {
    matches!(error, RagError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}

fn is_generation_name(name: &str) -> bool {
    name.strip_prefix(GENERATION_PREFIX)
        .is_some_and(|id| uuid::Uuid::parse_str(id).is_ok())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| RagError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        RagError::VectorStoreError(format!("{} is unreadable: {e}", path.display()))
    })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    tokio::fs::write(path, bytes).await.map_err(|e| RagError::io(path, e))
}

/// Exclusive right to build into a store location. Released on drop.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(lock = %self.path.display(), "released build lock"),
            Err(e) => {
                warn!(lock = %self.path.display(), error = %e, "failed to release build lock")
            }
        }
    }
}
