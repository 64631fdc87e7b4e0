//! Storage doubles for unit tests.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{KeyValueStore, MemoryStore, StorageError};

/// A [`MemoryStore`] whose writes to chosen keys fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing_keys: Mutex<Vec<String>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `set_item(key, ..)` fail.
    pub fn fail_writes_to(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
    }

    fn fails(&self, key: &str) -> bool {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|k| k == key)
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fails(key) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.inner.clear_all().await
    }
}
