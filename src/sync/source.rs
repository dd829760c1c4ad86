//! Document sources enumerated by synchronization runs.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised by document sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source could not be enumerated at all.
    #[error("{0}")]
    Unavailable(String),
    /// Reading a single item failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Location of the item.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Reference to one item that needs synchronizing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    /// Stable identifier, also used in cache keys.
    pub id: String,
    /// Location of the item, recorded with the indexed document.
    pub uri: String,
    /// Content fingerprint observed during enumeration.
    pub fingerprint: String,
}

/// Source of documents for synchronization runs.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Items whose content changed since they were last synced.
    async fn list_items_needing_sync(&self) -> Result<Vec<ItemRef>, SourceError>;

    /// Full text of `item`.
    async fn fetch_content(&self, item: &ItemRef) -> Result<String, SourceError>;

    /// Remember that `item` reached the index so it is skipped until it changes again.
    async fn mark_synced(&self, _item: &ItemRef) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Directory of text files; an item needs syncing when its SHA-256 differs from the last synced one.
pub struct FileSystemSource {
    root: PathBuf,
    synced: Mutex<HashMap<String, String>>,
}

impl FileSystemSource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            synced: Mutex::new(HashMap::new()),
        }
    }

    /// Directory scanned for documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(root: &Path) -> Result<Vec<ItemRef>, SourceError> {
        if !root.is_dir() {
            return Err(SourceError::Unavailable(format!(
                "documents root {} is not a directory",
                root.display()
            )));
        }

        let mut items = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|error| SourceError::Unavailable(error.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping unreadable document");
                    continue;
                }
            };
            let id = path
                .strip_prefix(root)
                .unwrap_or(path)
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            items.push(ItemRef {
                id,
                uri: path.display().to_string(),
                fingerprint: hex::encode(Sha256::digest(&bytes)),
            });
        }
        Ok(items)
    }
}

#[async_trait]
impl DocumentSource for FileSystemSource {
    async fn list_items_needing_sync(&self) -> Result<Vec<ItemRef>, SourceError> {
        let root = self.root.clone();
        let items = tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .map_err(|error| SourceError::Unavailable(format!("scan task failed: {error}")))??;

        let synced = self.synced.lock().unwrap_or_else(PoisonError::into_inner);
        let pending: Vec<ItemRef> = items
            .into_iter()
            .filter(|item| synced.get(&item.id) != Some(&item.fingerprint))
            .collect();
        tracing::debug!(
            root = %self.root.display(),
            pending = pending.len(),
            "Enumerated documents needing sync"
        );
        Ok(pending)
    }

    async fn fetch_content(&self, item: &ItemRef) -> Result<String, SourceError> {
        tokio::fs::read_to_string(&item.uri)
            .await
            .map_err(|source| SourceError::Read {
                path: item.uri.clone(),
                source,
            })
    }

    async fn mark_synced(&self, item: &ItemRef) -> Result<(), SourceError> {
        self.synced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id.clone(), item.fingerprint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_files_with_relative_ids_and_fingerprints() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
        std::fs::write(dir.path().join("nested/b.md"), "beta").expect("write");

        let source = FileSystemSource::new(dir.path());
        let items = source.list_items_needing_sync().await.expect("items");

        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "nested/b.md"]);
        assert_eq!(items[0].fingerprint, hex::encode(Sha256::digest(b"alpha")));
        assert_eq!(
            source.fetch_content(&items[1]).await.expect("content"),
            "beta"
        );
    }

    #[tokio::test]
    async fn synced_items_are_skipped_until_they_change() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "v1").expect("write");

        let source = FileSystemSource::new(dir.path());
        let items = source.list_items_needing_sync().await.expect("items");
        source.mark_synced(&items[0]).await.expect("mark");
        assert!(source.list_items_needing_sync().await.expect("items").is_empty());

        std::fs::write(&path, "v2").expect("rewrite");
        assert_eq!(source.list_items_needing_sync().await.expect("items").len(), 1);
    }

    #[tokio::test]
    async fn binary_file_is_listed_but_fails_to_read() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("image.png"), [0xff, 0xfe, 0x00, 0x80]).expect("write");

        let source = FileSystemSource::new(dir.path());
        let items = source.list_items_needing_sync().await.expect("items");
        assert_eq!(items.len(), 1);
        let error = source
            .fetch_content(&items[0])
            .await
            .expect_err("not utf-8");
        assert!(matches!(error, SourceError::Read { .. }));
    }

    #[tokio::test]
    async fn missing_root_is_unavailable() {
        let dir = tempdir().expect("tempdir");
        let source = FileSystemSource::new(dir.path().join("missing"));
        let error = source
            .list_items_needing_sync()
            .await
            .expect_err("missing root");
        assert!(matches!(error, SourceError::Unavailable(_)));
    }
}
