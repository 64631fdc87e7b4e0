//! `reqwest` implementation of [`RemoteGateway`].

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::{GatewayError, MultipartUpload, RemoteGateway, error_message, unwrap_envelope};
use crate::config::ApiConfig;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the optional application API key.
const API_KEY_HEADER: &str = "x-api-key";

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// HTTP client for the Recipe Box backend.
///
/// Cheap to clone; clones share the connection pool, the bearer token and
/// the unauthorized hook.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<HttpGatewayInner>,
}

struct HttpGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    bearer: RwLock<Option<SecretString>>,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

impl HttpGateway {
    /// Create a new gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key.expose_secret())
                .map_err(|e| GatewayError::InvalidHeader(format!("Invalid API key format: {e}")))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpGatewayInner {
                client,
                base_url: with_trailing_slash(config.base_url.clone()),
                bearer: RwLock::new(None),
                on_unauthorized: RwLock::new(None),
            }),
        })
    }

    /// Register a callback run whenever the backend answers 401.
    ///
    /// This is where an app navigates back to its login screen; stores only
    /// see the resulting [`GatewayError::Unauthorized`].
    pub fn set_unauthorized_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// The base URL every path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let mut url = self.inner.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.inner.client.request(method, url);
        let bearer = self
            .inner
            .bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match bearer.as_ref() {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn notify_unauthorized(&self) {
        let hook = self
            .inner
            .on_unauthorized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Send a request and normalize the response.
    async fn send(&self, request: RequestBuilder) -> Result<Value, GatewayError> {
        let request_id = Uuid::new_v4().to_string();
        let response = request
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await?;

        let status = response.status();
        debug!(request_id = %request_id, status = %status, "Backend responded");

        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            warn!(request_id = %request_id, "Backend rejected credentials");
            self.notify_unauthorized();
            return Err(GatewayError::Unauthorized(error_message(&body)));
        }

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(GatewayError::RateLimited(retry_after));
        }

        let response_text = response.text().await?;

        if !status.is_success() {
            error!(
                request_id = %request_id,
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&response_text),
            });
        }

        if response_text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&response_text).map_err(|e| {
            error!(
                request_id = %request_id,
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            GatewayError::Decode(e)
        })?;

        Ok(unwrap_envelope(value))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    #[instrument(skip(self, query), fields(method = "GET"))]
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError> {
        let url = self.url(path, query)?;
        self.send(self.request(Method::GET, url)).await
    }

    #[instrument(skip(self, body), fields(method = "POST"))]
    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let url = self.url(path, &[])?;
        self.send(self.request(Method::POST, url).json(&body)).await
    }

    #[instrument(skip(self, body), fields(method = "PUT"))]
    async fn put(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let url = self.url(path, &[])?;
        self.send(self.request(Method::PUT, url).json(&body)).await
    }

    #[instrument(skip(self), fields(method = "DELETE"))]
    async fn delete(&self, path: &str) -> Result<Value, GatewayError> {
        let url = self.url(path, &[])?;
        self.send(self.request(Method::DELETE, url)).await
    }

    #[instrument(skip(self, upload), fields(method = "POST", multipart = true))]
    async fn post_multipart(
        &self,
        path: &str,
        upload: MultipartUpload,
    ) -> Result<Value, GatewayError> {
        let url = self.url(path, &[])?;

        let data = reqwest::multipart::Part::text(upload.data.to_string())
            .mime_str("application/json")?;
        let mut form = reqwest::multipart::Form::new().part("data", data);
        if let Some(image) = upload.image {
            let part = reqwest::multipart::Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?;
            form = form.part("image", part);
        }

        self.send(self.request(Method::POST, url).multipart(form))
            .await
    }

    fn set_bearer_token(&self, token: Option<SecretString>) {
        *self
            .inner
            .bearer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(&ApiConfig {
            base_url: Url::parse(base).unwrap(),
            timeout: Duration::from_secs(5),
            api_key: None,
        })
        .unwrap()
    }

    #[test]
    fn test_paths_resolve_under_base_path() {
        let gateway = gateway("https://api.example.com/v1");
        assert_eq!(gateway.base_url().as_str(), "https://api.example.com/v1/");

        let url = gateway.url("recipes/r1", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/recipes/r1");

        let url = gateway.url("/favorites", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/favorites");
    }

    #[test]
    fn test_query_is_encoded() {
        let gateway = gateway("https://api.example.com/");
        let url = gateway
            .url("recipes", &[("search", "mac & cheese"), ("categoryId", "c1")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/recipes?search=mac+%26+cheese&categoryId=c1"
        );
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let result = HttpGateway::new(&ApiConfig {
            base_url: Url::parse("https://api.example.com/").unwrap(),
            timeout: Duration::from_secs(5),
            api_key: Some(SecretString::from("bad\nkey")),
        });
        assert!(matches!(result, Err(GatewayError::InvalidHeader(_))));
    }

    #[test]
    fn test_unauthorized_hook_runs() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let gateway = gateway("https://api.example.com/");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        gateway.set_unauthorized_hook(move || flag.store(true, Ordering::SeqCst));

        gateway.notify_unauthorized();
        assert!(fired.load(Ordering::SeqCst));
    }
}
