//! Persistent Key-Value Store: durable string storage surviving restarts.
//!
//! Stores persist JSON-serialized snapshots under fixed keys (see [`keys`]).
//! The store is shared by key namespacing only; there is no transaction
//! spanning several keys.
//!
//! # Implementations
//!
//! - [`MemoryStore`] - process-local map, for tests and ephemeral sessions
//! - [`FileStore`] - one JSON document on disk, replaced atomically on write

mod file;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur when reading or writing durable storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing document exists but is unreadable.
    #[error("Storage is corrupt: {0}")]
    Corrupt(String),
}

/// Asynchronous string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key is absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key.
    async fn clear_all(&self) -> Result<(), StorageError>;
}

/// Keys used by the stores.
pub mod keys {
    /// Cart lines, as a JSON array.
    pub const CART: &str = "cart";

    /// Theme preference, as a JSON string.
    pub const THEME: &str = "theme";

    /// Logged-in user's ID.
    pub const AUTH_USER_ID: &str = "auth.userId";

    /// Bearer token for API requests.
    pub const AUTH_ACCESS_TOKEN: &str = "auth.accessToken";

    /// Token for obtaining a new access token.
    pub const AUTH_REFRESH_TOKEN: &str = "auth.refreshToken";

    /// All session keys, in write order.
    pub const AUTH_ALL: [&str; 3] = [AUTH_USER_ID, AUTH_ACCESS_TOKEN, AUTH_REFRESH_TOKEN];
}

/// Read and deserialize a JSON value.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the stored text is not valid
/// JSON for `T`, or the underlying read error.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get_item(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
///
/// # Errors
///
/// Returns the serialization or write error.
pub async fn save_json<T: Serialize + Sync + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set_item(key, &raw).await
}
