//! Scripted in-memory gateway for tests.
//!
//! Responses are queued per `(method, path)`; each call pops the next one,
//! and the last queued response repeats once the queue is drained. Every
//! call is recorded so tests can assert on ordering, bodies and query
//! strings. Canned values may be enveloped; like [`HttpGateway`](super::HttpGateway)
//! the mock strips `{ "result": .. }` before returning.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{GatewayError, MultipartUpload, RemoteGateway, unwrap_envelope};

/// A call received by [`MockGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub multipart: Option<MultipartUpload>,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
enum Canned {
    Ok(Value),
    Status(u16, String),
    Unauthorized,
    Network(String),
}

impl Canned {
    fn to_result(&self) -> Result<Value, GatewayError> {
        match self {
            Self::Ok(value) => Ok(unwrap_envelope(value.clone())),
            Self::Status(status, message) => Err(GatewayError::Status {
                status: *status,
                message: message.clone(),
            }),
            Self::Unauthorized => Err(GatewayError::Unauthorized("token expired".to_string())),
            Self::Network(message) => Err(GatewayError::Transport(message.clone())),
        }
    }
}

#[derive(Debug, Clone)]
struct Scripted {
    response: Canned,
    delay: Option<Duration>,
}

/// A [`RemoteGateway`] that answers from a script instead of the network.
#[derive(Default)]
pub struct MockGateway {
    routes: Mutex<HashMap<(&'static str, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    bearer: Mutex<Option<SecretString>>,
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn respond(&self, method: &'static str, path: &str, value: Value) -> &Self {
        self.push(method, path, Canned::Ok(value), None)
    }

    /// Queue a successful response delivered after `delay`.
    pub fn respond_after(
        &self,
        method: &'static str,
        path: &str,
        delay: Duration,
        value: Value,
    ) -> &Self {
        self.push(method, path, Canned::Ok(value), Some(delay))
    }

    /// Queue a non-success HTTP status.
    pub fn fail_status(&self, method: &'static str, path: &str, status: u16, message: &str) -> &Self {
        self.push(method, path, Canned::Status(status, message.to_string()), None)
    }

    /// Queue a 401.
    pub fn fail_unauthorized(&self, method: &'static str, path: &str) -> &Self {
        self.push(method, path, Canned::Unauthorized, None)
    }

    /// Queue a transport failure.
    pub fn fail_network(&self, method: &'static str, path: &str, message: &str) -> &Self {
        self.push(method, path, Canned::Network(message.to_string()), None)
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls received for one `(method, path)`.
    #[must_use]
    pub fn calls_to(&self, method: &str, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    /// The bearer token currently installed.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.bearer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| token.expose_secret().to_string())
    }

    fn push(
        &self,
        method: &'static str,
        path: &str,
        response: Canned,
        delay: Option<Duration>,
    ) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted { response, delay });
        self
    }

    async fn answer(
        &self,
        method: &'static str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
        multipart: Option<MultipartUpload>,
    ) -> Result<Value, GatewayError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method,
                path: path.to_string(),
                query: query
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                body,
                multipart,
                bearer: self.bearer(),
            });

        let scripted = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let queue = routes.get_mut(&(method, path.to_string()));
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let Some(scripted) = scripted else {
            return Err(GatewayError::Status {
                status: 404,
                message: format!("no scripted response for {method} {path}"),
            });
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.response.to_result()
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError> {
        self.answer("GET", path, query, None, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        self.answer("POST", path, &[], Some(body), None).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        self.answer("PUT", path, &[], Some(body), None).await
    }

    async fn delete(&self, path: &str) -> Result<Value, GatewayError> {
        self.answer("DELETE", path, &[], None, None).await
    }

    async fn post_multipart(
        &self,
        path: &str,
        upload: MultipartUpload,
    ) -> Result<Value, GatewayError> {
        self.answer("POST", path, &[], None, Some(upload)).await
    }

    fn set_bearer_token(&self, token: Option<SecretString>) {
        *self.bearer.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_enveloped_response_is_unwrapped() {
        let gateway = MockGateway::new();
        gateway
            .respond("GET", "recipes/r1", json!({"result": {"id": "r1"}}))
            .respond("GET", "recipes", json!([{"id": "r1"}]));

        let single = gateway.get("recipes/r1", &[]).await.unwrap();
        let bare = gateway.get("recipes", &[]).await.unwrap();

        assert_eq!(single, json!({"id": "r1"}));
        assert_eq!(bare, json!([{"id": "r1"}]));
    }

    #[tokio::test]
    async fn test_unscripted_route_is_not_found() {
        let gateway = MockGateway::new();

        let err = gateway.delete("favorites/r9").await.unwrap_err();

        assert!(matches!(err, GatewayError::Status { status: 404, .. }));
        assert_eq!(gateway.calls_to("DELETE", "favorites/r9").len(), 1);
    }
}
