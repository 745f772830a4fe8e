//! Loading source documents from a directory tree.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::{Document, DocumentMetadata};
use crate::error::{RagError, Result};

/// Reads every file under a root directory whose extension matches one of a
/// set of extensions (case-insensitively) into a [`Document`].
///
/// Files are visited in lexicographic path order so repeated loads of an
/// unchanged tree produce documents in the same order.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DocumentLoader {
    /// Create a loader for `root` accepting markdown files (`.md`, `.MD`, ...).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), extensions: vec!["md".to_string()] }
    }

    /// Accept files with any of these extensions instead. A leading dot is ignored.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// The root directory documents are loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List matching files, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SourceNotFound`] if the root does not exist or is
    /// not a directory, and [`RagError::Io`] if the tree cannot be walked.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Err(RagError::SourceNotFound {
                path: self.root.clone(),
                reason: "directory does not exist".to_string(),
            });
        }
        if !self.root.is_dir() {
            return Err(RagError::SourceNotFound {
                path: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                RagError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if entry.file_type().is_file() && self.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load every matching file as a [`Document`].
    ///
    /// The document id is the path relative to the root with `/` separators;
    /// `source` metadata is the full path as discovered.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SourceNotFound`] if no file matches, and
    /// [`RagError::Io`] if a file cannot be read as UTF-8 text.
    pub async fn load(&self) -> Result<Vec<Document>> {
        let files = self.discover()?;
        if files.is_empty() {
            return Err(RagError::SourceNotFound {
                path: self.root.clone(),
                reason: format!("no files with extension {}", self.extensions.join(", ")),
            });
        }

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| RagError::io(&path, e))?;
            let id = relative_id(&self.root, &path);
            debug!(document.id = %id, bytes = text.len(), "loaded document");
            let metadata = DocumentMetadata::new(path.to_string_lossy());
            documents.push(Document::new(id, text, metadata)?);
        }

        info!(root = %self.root.display(), documents = documents.len(), "loaded documents");
        Ok(documents)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
    }
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn loads_markdown_recursively_in_path_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("b.md"), "bravo").unwrap();
        fs::write(root.join("A.MD"), "alpha").unwrap();
        fs::write(root.join("nested/deeper/c.Md"), "charlie").unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();

        let documents = DocumentLoader::new(root).load().await.unwrap();
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["A.MD", "b.md", "nested/deeper/c.Md"]);
        assert_eq!(documents[2].text, "charlie");
        assert!(documents[2].metadata.source.ends_with("c.Md"));
    }

    #[tokio::test]
    async fn custom_extensions_replace_default() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();

        let loader = DocumentLoader::new(temp.path()).with_extensions([".TXT"]);
        let documents = loader.load().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "b.txt");
    }

    #[tokio::test]
    async fn missing_root_is_source_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let err = DocumentLoader::new(temp.path().join("absent")).load().await.unwrap_err();
        assert!(matches!(err, RagError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_root_is_source_not_found() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("only.txt"), "x").unwrap();
        let err = DocumentLoader::new(temp.path()).load().await.unwrap_err();
        assert!(matches!(err, RagError::SourceNotFound { .. }));
    }
}
