//! Remote Data Gateway: the backend REST API as seen by the stores.
//!
//! # Architecture
//!
//! - [`RemoteGateway`] is a small, object-safe trait speaking JSON values, so
//!   stores hold an `Arc<dyn RemoteGateway>` and tests can swap in a scripted
//!   implementation.
//! - [`HttpGateway`] is the `reqwest` implementation used in production.
//! - The backend answers either with a bare payload or with
//!   `{ "result": payload }`; implementations unwrap the envelope (see
//!   [`unwrap_envelope`]) before a store ever sees the value.
//!
//! # Example
//!
//! ```rust,ignore
//! use recipe_box_client::gateway::{HttpGateway, RemoteGateway, decode};
//!
//! let gateway = HttpGateway::new(&config.api)?;
//! let recipes: Vec<Recipe> = decode(gateway.get("recipes", &[]).await?)?;
//! ```

mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use http::{HttpGateway, REQUEST_ID_HEADER};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the credentials (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Response body was not the expected JSON shape.
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A path could not be joined onto the base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A configured header value is not valid HTTP.
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Transport failure outside `reqwest` (used by non-HTTP gateways).
    #[error("Network error: {0}")]
    Transport(String),
}

/// An image attached to a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A multipart body: a JSON `data` part plus an optional `image` file part.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartUpload {
    pub data: Value,
    pub image: Option<ImageUpload>,
}

/// CRUD-style access to the backend.
///
/// Paths are relative to the configured base URL (`"recipes"`,
/// `"favorites/r1"`). Every method returns the unwrapped payload; an empty
/// response body is `Value::Null`.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// `GET path?query`.
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError>;

    /// `POST path` with a JSON body.
    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError>;

    /// `PUT path` with a JSON body.
    async fn put(&self, path: &str, body: Value) -> Result<Value, GatewayError>;

    /// `DELETE path`.
    async fn delete(&self, path: &str) -> Result<Value, GatewayError>;

    /// `POST path` as `multipart/form-data`.
    async fn post_multipart(
        &self,
        path: &str,
        upload: MultipartUpload,
    ) -> Result<Value, GatewayError>;

    /// Install or clear the bearer token sent with every request.
    fn set_bearer_token(&self, token: Option<SecretString>);
}

/// Strip the `{ "result": payload }` envelope if present.
#[must_use]
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Decode an unwrapped payload into a typed record.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] if the payload does not match `T`.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, GatewayError> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a request body.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] if `body` cannot be represented as JSON.
pub fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, GatewayError> {
    Ok(serde_json::to_value(body)?)
}

/// Pull a human-readable message out of an error response body.
///
/// Prefers a `message` or `error` string field, otherwise the first 200
/// characters of the raw body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    body.chars().take(200).collect()
}
