//! File-backed key-value store.
//!
//! All keys live in a single JSON object on disk. Writes go to a sibling
//! temp file first and are then renamed over the original, so a crash
//! mid-write leaves either the old or the new document, never a torn one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{KeyValueStore, StorageError};

type Document = BTreeMap<String, String>;

/// Durable storage in one JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Loaded lazily on first access; the lock also serializes writers.
    document: Mutex<Option<Document>>,
}

impl FileStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(None),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Document, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::Corrupt(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, document), fields(path = %self.path.display(), keys = document.len()))]
    async fn write_document(&self, document: &Document) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_string_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Storage flushed");
        Ok(())
    }

    /// Apply `change` to the document and flush it. The in-memory copy is
    /// only updated once the file write succeeded.
    async fn update<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Document) + Send,
    {
        let mut guard = self.document.lock().await;
        let mut document = match guard.as_ref() {
            Some(document) => document.clone(),
            None => self.read_document().await?,
        };
        change(&mut document);
        self.write_document(&document).await?;
        *guard = Some(document);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_document().await?);
        }
        Ok(guard.as_ref().and_then(|document| document.get(key).cloned()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |document| {
            document.insert(key, value);
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.update(move |document| {
            document.remove(&key);
        })
        .await
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.update(Document::clear).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::new(&path);
        store.set_item("theme", "\"dark\"").await.unwrap();
        store.set_item("cart", "[]").await.unwrap();
        store.remove_item("cart").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get_item("theme").await.unwrap().as_deref(),
            Some("\"dark\"")
        );
        assert_eq!(reopened.get_item("cart").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get_item("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = FileStore::new(&path);
        let result = store.get_item("cart").await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_clear_all_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::new(&path);
        store.set_item("a", "1").await.unwrap();
        store.clear_all().await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.trim(), "{}");
        assert!(!dir.path().join("state.json.tmp").exists());
    }
}
