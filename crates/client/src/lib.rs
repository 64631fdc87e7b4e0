//! Recipe Box Client - local state synchronization for the Recipe Box app.
//!
//! Keeps an in-memory mirror of backend entities and locally persisted state
//! (cart, theme, session), and exposes the actions that mutate them.
//!
//! # Architecture
//!
//! - [`gateway`] - The backend REST API behind the [`RemoteGateway`] trait
//! - [`storage`] - Durable key-value storage behind the [`KeyValueStore`] trait
//! - [`store`] - Entity, cart, recipe, auth, theme and search stores
//! - [`state`] - [`AppState`], the container that owns every store
//!
//! Stores never talk to each other. They share the gateway (and its bearer
//! token) and the key-value store, namespaced by key.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod gateway;
pub mod state;
pub mod storage;
pub mod store;

pub use config::{ApiConfig, ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use gateway::{GatewayError, HttpGateway, RemoteGateway};
pub use state::AppState;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
