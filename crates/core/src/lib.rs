//! Recipe Box Core - Shared types library.
//!
//! This crate provides the pieces of the Recipe Box client that need no I/O:
//! - [`types`] - Newtype IDs, email, order status, user role and theme
//! - [`models`] - Entity records mirrored from the backend
//! - [`cart`] - Cart lines and the pure cart reducer
//! - [`search`] - Local search/filter utility
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no HTTP clients, no
//! storage. The stores in `recipe-box-client` wrap these with the remote
//! gateway and the key-value store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod models;
pub mod search;
pub mod types;

pub use cart::{CartLine, CartState, InvalidQuantity};
pub use models::*;
pub use types::*;
