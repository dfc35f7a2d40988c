//! Document context for the first iteration.
//!
//! A sequence names a set of folders; a [`DocumentSource`] turns them into
//! documents that are prepended to the initial prompt as opaque text.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A named text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub content: String,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Resolves folder ids to documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn documents(&self, folders: &[String]) -> Result<Vec<Document>>;
}

/// Never returns documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocuments;

#[async_trait]
impl DocumentSource for NoDocuments {
    async fn documents(&self, _folders: &[String]) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }
}

/// In-memory documents keyed by folder id.
#[derive(Debug, Clone, Default)]
pub struct StaticDocuments {
    folders: HashMap<String, Vec<Document>>,
}

impl StaticDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, folder: impl Into<String>, document: Document) -> Self {
        self.folders.entry(folder.into()).or_default().push(document);
        self
    }
}

#[async_trait]
impl DocumentSource for StaticDocuments {
    async fn documents(&self, folders: &[String]) -> Result<Vec<Document>> {
        Ok(folders
            .iter()
            .filter_map(|folder| self.folders.get(folder))
            .flatten()
            .cloned()
            .collect())
    }
}

/// Reads UTF-8 files directly under each folder, resolved against a root.
///
/// Non-UTF-8 files and subdirectories are skipped.
#[derive(Debug, Clone)]
pub struct DirectoryDocuments {
    root: PathBuf,
    max_bytes: u64,
}

impl DirectoryDocuments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: 256 * 1024,
        }
    }

    /// Files larger than this are skipped.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn read_folder(&self, folder: &Path) -> Result<Vec<Document>> {
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut documents = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() || metadata.len() > self.max_bytes {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            match String::from_utf8(bytes) {
                Ok(content) => documents.push(Document::new(
                    entry.file_name().to_string_lossy().into_owned(),
                    content,
                )),
                Err(_) => {
                    tracing::debug!(path = %entry.path().display(), "Skipping non-UTF-8 document");
                }
            }
        }

        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocuments {
    async fn documents(&self, folders: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for folder in folders {
            documents.extend(self.read_folder(&self.root.join(folder)).await?);
        }
        Ok(documents)
    }
}

/// Render documents as a context block. Empty input renders as nothing.
pub fn render_documents(documents: &[Document]) -> String {
    let mut out = String::new();
    for doc in documents {
        out.push_str(&format!("--- {} ---\n{}\n", doc.name, doc.content.trim_end()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_documents() {
        let source = StaticDocuments::new()
            .with_document("specs", Document::new("a.md", "alpha"))
            .with_document("notes", Document::new("b.md", "beta"));

        let docs = source.documents(&["specs".into(), "missing".into()]).await.unwrap();
        assert_eq!(docs, vec![Document::new("a.md", "alpha")]);
    }

    #[tokio::test]
    async fn test_directory_documents() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("docs");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        std::fs::write(folder.join("b.txt"), "second").unwrap();
        std::fs::write(folder.join("a.txt"), "first").unwrap();
        std::fs::write(folder.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(folder.join("big.txt"), "x".repeat(64)).unwrap();

        let source = DirectoryDocuments::new(dir.path()).with_max_bytes(32);
        let docs = source.documents(&["docs".into()]).await.unwrap();

        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_directory_missing_folder_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryDocuments::new(dir.path());
        assert!(source.documents(&["nope".into()]).await.is_err());
    }

    #[test]
    fn test_render_documents() {
        assert_eq!(render_documents(&[]), "");
        assert_eq!(
            render_documents(&[Document::new("a.md", "alpha\n")]),
            "--- a.md ---\nalpha\n"
        );
    }
}
