//! Unified error type for store actions.
//!
//! Every store action records `error.to_string()` in its own `error` field
//! and also returns the error, so callers can either render the message or
//! branch on the variant.

use recipe_box_core::InvalidQuantity;
use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::storage::StorageError;

/// Errors returned by store actions.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend call failed.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// Durable storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A cart line carried a NaN or infinite quantity.
    #[error("{0}")]
    InvalidQuantity(#[from] InvalidQuantity),

    /// Checkout was attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The action requires a logged-in session.
    #[error("Not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Whether the backend rejected the session (HTTP 401).
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Unauthorized(_)))
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
