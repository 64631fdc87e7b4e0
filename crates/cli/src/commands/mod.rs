//! Subcommand implementations. Each one drives a store on [`AppState`] and
//! prints the resulting state.
//!
//! [`AppState`]: recipe_box_client::AppState

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod recipes;
pub mod theme;

use thiserror::Error;

/// Errors raised by the CLI itself rather than the stores.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The backend refused the request; the store recorded why.
    #[error("{action} rejected: {reason}")]
    Rejected { action: &'static str, reason: String },

    /// A price argument was not a decimal number.
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}
