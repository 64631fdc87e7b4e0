//! Stores: in-memory mirrors of backend and persisted state.
//!
//! Every store is `Send + Sync` and shared behind [`AppState`](crate::AppState).
//! Actions are `async`, record a failure message in the store's `error` field
//! and also return the error.

mod auth;
mod cart;
mod entity;
mod recipe;
mod search;
mod sequence;
mod theme;

pub use auth::{AuthStatus, AuthStore, Credentials, Registration, Session};
pub use cart::CartStore;
pub use entity::{Entity, EntitySnapshot, EntityStore};
pub use recipe::{RecipeFilter, RecipeSnapshot, RecipeStore};
pub use search::SearchStore;
pub use sequence::{SequenceGuard, Ticket};
pub use theme::ThemeStore;
