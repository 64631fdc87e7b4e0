//! Auth/session store.
//!
//! The session is the triple `(user_id, access_token, refresh_token)`. It is
//! all-or-nothing both in memory and in durable storage: `login` publishes
//! `LoggedIn` only after all three keys are written, a failed write puts the
//! keys already written back to their earlier values, and `restore` discards
//! a partial set.

use std::fmt;
use std::sync::Arc;

use recipe_box_core::{Email, User, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ClientError, Result};
use crate::gateway::{RemoteGateway, decode};
use crate::storage::{KeyValueStore, StorageError, keys};

/// Where the session lifecycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::LoggingIn => write!(f, "logging in"),
            Self::LoggedIn => write!(f, "logged in"),
        }
    }
}

/// Email and password for `auth/login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: Email, password: impl Into<String>) -> Self {
        Self {
            email,
            password: SecretString::from(password.into()),
        }
    }
}

/// Sign-up details for `auth/register`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: Option<String>,
    pub credentials: Credentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user_id: UserId,
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user: Option<User>,
}

/// An authenticated session.
#[derive(Clone)]
pub struct Session {
    pub user_id: UserId,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Default)]
struct AuthInner {
    status: AuthStatus,
    session: Option<Session>,
    user: Option<User>,
    error: Option<String>,
}

/// Login state, mirrored to durable storage.
pub struct AuthStore {
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn KeyValueStore>,
    inner: RwLock<AuthInner>,
}

impl AuthStore {
    /// Create a logged-out store. Call [`restore`](Self::restore) to pick up
    /// a persisted session.
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            gateway,
            storage,
            inner: RwLock::new(AuthInner::default()),
        }
    }

    /// Log in.
    ///
    /// Returns `Ok(false)` when the backend rejects the attempt; the message
    /// is available from [`error`](Self::error) and no session state changes.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the session could not be persisted. Keys
    /// already written are restored, so a previous session stays intact.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<bool> {
        let previous = {
            let mut inner = self.inner.write().await;
            let previous = inner.status;
            inner.status = AuthStatus::LoggingIn;
            inner.error = None;
            previous
        };

        let body = json!({
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
        });
        let response = match self
            .gateway
            .post("auth/login", body)
            .await
            .and_then(decode::<LoginResponse>)
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                let mut inner = self.inner.write().await;
                inner.status = previous;
                inner.error = Some(e.to_string());
                return Ok(false);
            }
        };

        let session = Session {
            user_id: response.user_id,
            access_token: SecretString::from(response.access_token),
            refresh_token: SecretString::from(response.refresh_token),
        };

        if let Err(e) = self.persist(&session).await {
            let mut inner = self.inner.write().await;
            inner.status = previous;
            inner.error = Some(e.to_string());
            return Err(e.into());
        }

        self.gateway
            .set_bearer_token(Some(session.access_token.clone()));

        let mut inner = self.inner.write().await;
        info!(user_id = %session.user_id, "Logged in");
        inner.session = Some(session);
        inner.user = response.user;
        inner.status = AuthStatus::LoggedIn;
        Ok(true)
    }

    /// Create an account, then log in with the same credentials.
    ///
    /// Returns `Ok(false)` when either step is rejected by the backend.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the login step.
    #[instrument(skip(self, registration), fields(email = %registration.credentials.email))]
    pub async fn register(&self, registration: &Registration) -> Result<bool> {
        let credentials = &registration.credentials;
        let body = json!({
            "name": registration.name,
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
        });

        if let Err(e) = self.gateway.post("auth/register", body).await {
            warn!(error = %e, "Registration failed");
            self.inner.write().await.error = Some(e.to_string());
            return Ok(false);
        }

        self.login(credentials).await
    }

    /// End the session in memory, on the gateway and in storage.
    ///
    /// # Errors
    ///
    /// Returns the storage error if a key could not be removed. The in-memory
    /// session is cleared regardless.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            inner.session = None;
            inner.user = None;
            inner.error = None;
            inner.status = AuthStatus::LoggedOut;
        }
        self.gateway.set_bearer_token(None);

        if let Err(e) = self.remove_persisted().await {
            error!(error = %e, "Failed to remove persisted session");
            self.inner.write().await.error = Some(e.to_string());
            return Err(e.into());
        }
        info!("Logged out");
        Ok(())
    }

    /// Pick up a persisted session at start-up.
    ///
    /// Returns `true` when a complete session was found. A partial set of keys
    /// (left by an interrupted write) is removed.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the keys could not be read or a partial
    /// set could not be removed.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<bool> {
        let user_id = self.storage.get_item(keys::AUTH_USER_ID).await?;
        let access_token = self.storage.get_item(keys::AUTH_ACCESS_TOKEN).await?;
        let refresh_token = self.storage.get_item(keys::AUTH_REFRESH_TOKEN).await?;

        match (user_id, access_token, refresh_token) {
            (Some(user_id), Some(access_token), Some(refresh_token)) => {
                let session = Session {
                    user_id: UserId::new(user_id),
                    access_token: SecretString::from(access_token),
                    refresh_token: SecretString::from(refresh_token),
                };
                self.gateway
                    .set_bearer_token(Some(session.access_token.clone()));

                let mut inner = self.inner.write().await;
                debug!(user_id = %session.user_id, "Restored session");
                inner.session = Some(session);
                inner.status = AuthStatus::LoggedIn;
                Ok(true)
            }
            (None, None, None) => Ok(false),
            _ => {
                warn!("Discarding partial persisted session");
                self.remove_persisted().await?;
                Ok(false)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub async fn status(&self) -> AuthStatus {
        self.inner.read().await.status
    }

    pub async fn is_logged_in(&self) -> bool {
        self.status().await == AuthStatus::LoggedIn
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.inner
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.user_id.clone())
    }

    /// The current session, if logged in.
    pub async fn session(&self) -> Option<Session> {
        self.inner.read().await.session.clone()
    }

    /// Profile returned by the last login, when the backend included one.
    pub async fn user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    /// The current session or [`ClientError::NotLoggedIn`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotLoggedIn`] when there is no session.
    pub async fn require_session(&self) -> Result<Session> {
        self.session().await.ok_or(ClientError::NotLoggedIn)
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn persist(&self, session: &Session) -> std::result::Result<(), StorageError> {
        let values = [
            (keys::AUTH_USER_ID, session.user_id.as_str()),
            (keys::AUTH_ACCESS_TOKEN, session.access_token.expose_secret()),
            (keys::AUTH_REFRESH_TOKEN, session.refresh_token.expose_secret()),
        ];

        let mut prior = Vec::with_capacity(values.len());
        for (key, _) in &values {
            prior.push(self.storage.get_item(key).await?);
        }

        for (written, (key, value)) in values.iter().enumerate() {
            if let Err(e) = self.storage.set_item(key, value).await {
                error!(error = %e, key, "Failed to persist session, rolling back");
                for ((key, _), previous) in values.iter().zip(&prior).take(written) {
                    self.rollback(key, previous.as_deref()).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Put `key` back to the value it held before a failed session write.
    async fn rollback(&self, key: &str, previous: Option<&str>) {
        let result = match previous {
            Some(value) => self.storage.set_item(key, value).await,
            None => self.storage.remove_item(key).await,
        };
        if let Err(e) = result {
            error!(error = %e, key, "Rollback failed");
        }
    }

    async fn remove_persisted(&self) -> std::result::Result<(), StorageError> {
        for key in keys::AUTH_ALL {
            self.storage.remove_item(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::storage::MemoryStore;
    use crate::storage::testing::FailingStore;

    fn credentials() -> Credentials {
        Credentials::new(Email::parse("cook@example.com").unwrap(), "hunter2")
    }

    fn login_ok(gateway: &MockGateway) {
        gateway.respond(
            "POST",
            "auth/login",
            json!({"result": {
                "userId": "u1",
                "accessToken": "access-1",
                "refreshToken": "refresh-1",
                "user": {"id": "u1", "email": "cook@example.com", "role": "admin"}
            }}),
        );
    }

    fn store(gateway: &Arc<MockGateway>, storage: Arc<dyn KeyValueStore>) -> AuthStore {
        AuthStore::new(Arc::clone(gateway) as Arc<dyn RemoteGateway>, storage)
    }

    async fn persisted(storage: &dyn KeyValueStore) -> Vec<Option<String>> {
        let mut values = Vec::new();
        for key in keys::AUTH_ALL {
            values.push(storage.get_item(key).await.unwrap());
        }
        values
    }

    #[tokio::test]
    async fn test_login_persists_whole_session() {
        let gateway = Arc::new(MockGateway::new());
        login_ok(&gateway);
        let storage = Arc::new(MemoryStore::new());
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);

        assert!(auth.login(&credentials()).await.unwrap());

        assert_eq!(auth.status().await, AuthStatus::LoggedIn);
        assert_eq!(auth.user_id().await.unwrap().as_str(), "u1");
        assert!(auth.user().await.unwrap().is_admin());
        assert_eq!(gateway.bearer().as_deref(), Some("access-1"));
        assert_eq!(
            persisted(storage.as_ref()).await,
            [
                Some("u1".to_string()),
                Some("access-1".to_string()),
                Some("refresh-1".to_string())
            ]
        );

        let body = gateway.calls_to("POST", "auth/login")[0].body.clone().unwrap();
        assert_eq!(body, json!({"email": "cook@example.com", "password": "hunter2"}));
    }

    #[tokio::test]
    async fn test_rejected_login_changes_nothing() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_status("POST", "auth/login", 400, "Invalid credentials");
        let storage = Arc::new(MemoryStore::new());
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);

        assert!(!auth.login(&credentials()).await.unwrap());

        assert_eq!(auth.status().await, AuthStatus::LoggedOut);
        assert!(auth.session().await.is_none());
        assert!(auth.error().await.unwrap().contains("Invalid credentials"));
        assert!(gateway.bearer().is_none());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_written_keys() {
        let gateway = Arc::new(MockGateway::new());
        login_ok(&gateway);
        let storage = Arc::new(FailingStore::new());
        storage.fail_writes_to(keys::AUTH_REFRESH_TOKEN);
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);

        let result = auth.login(&credentials()).await;

        assert!(matches!(result, Err(ClientError::Storage(_))));
        assert_eq!(auth.status().await, AuthStatus::LoggedOut);
        assert!(gateway.bearer().is_none());
        assert_eq!(persisted(storage.as_ref()).await, [None, None, None]);
    }

    #[tokio::test]
    async fn test_failed_relogin_keeps_previous_session() {
        let gateway = Arc::new(MockGateway::new());
        login_ok(&gateway);
        gateway.respond(
            "POST",
            "auth/login",
            json!({"userId": "u2", "accessToken": "access-2", "refreshToken": "refresh-2"}),
        );
        let storage = Arc::new(FailingStore::new());
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);
        assert!(auth.login(&credentials()).await.unwrap());

        storage.fail_writes_to(keys::AUTH_REFRESH_TOKEN);
        let result = auth.login(&credentials()).await;

        assert!(matches!(result, Err(ClientError::Storage(_))));
        assert_eq!(auth.status().await, AuthStatus::LoggedIn);
        assert_eq!(auth.user_id().await.unwrap().as_str(), "u1");
        assert_eq!(gateway.bearer().as_deref(), Some("access-1"));
        assert_eq!(
            persisted(storage.as_ref()).await,
            [
                Some("u1".to_string()),
                Some("access-1".to_string()),
                Some("refresh-1".to_string())
            ]
        );

        let restarted = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);
        assert!(restarted.restore().await.unwrap());
        assert_eq!(restarted.user_id().await.unwrap().as_str(), "u1");
    }

    #[tokio::test]
    async fn test_logout_removes_session_keys_only() {
        let gateway = Arc::new(MockGateway::new());
        login_ok(&gateway);
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(keys::THEME, "\"dark\"").await.unwrap();
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);
        auth.login(&credentials()).await.unwrap();

        auth.logout().await.unwrap();

        assert_eq!(auth.status().await, AuthStatus::LoggedOut);
        assert!(auth.session().await.is_none());
        assert!(gateway.bearer().is_none());
        assert_eq!(persisted(storage.as_ref()).await, [None, None, None]);
        assert!(storage.get_item(keys::THEME).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_complete_session() {
        let gateway = Arc::new(MockGateway::new());
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(keys::AUTH_USER_ID, "u9").await.unwrap();
        storage.set_item(keys::AUTH_ACCESS_TOKEN, "a9").await.unwrap();
        storage.set_item(keys::AUTH_REFRESH_TOKEN, "r9").await.unwrap();
        let auth = store(&gateway, storage);

        assert!(auth.restore().await.unwrap());
        assert!(auth.is_logged_in().await);
        assert_eq!(gateway.bearer().as_deref(), Some("a9"));
    }

    #[tokio::test]
    async fn test_restore_discards_partial_session() {
        let gateway = Arc::new(MockGateway::new());
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(keys::AUTH_USER_ID, "u9").await.unwrap();
        storage.set_item(keys::AUTH_ACCESS_TOKEN, "a9").await.unwrap();
        let auth = store(&gateway, Arc::clone(&storage) as Arc<dyn KeyValueStore>);

        assert!(!auth.restore().await.unwrap());
        assert_eq!(auth.status().await, AuthStatus::LoggedOut);
        assert!(storage.is_empty().await);
        assert!(matches!(
            auth.require_session().await,
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let gateway = Arc::new(MockGateway::new());
        gateway.respond("POST", "auth/register", json!({"id": "u1"}));
        login_ok(&gateway);
        let auth = store(&gateway, Arc::new(MemoryStore::new()));

        let registration = Registration {
            name: Some("Cook".to_string()),
            credentials: credentials(),
        };
        assert!(auth.register(&registration).await.unwrap());
        assert!(auth.is_logged_in().await);

        let body = gateway.calls_to("POST", "auth/register")[0].body.clone().unwrap();
        assert_eq!(body["name"], "Cook");
        assert_eq!(gateway.calls().len(), 2);
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session {
            user_id: UserId::new("u1"),
            access_token: SecretString::from("secret-access"),
            refresh_token: SecretString::from("secret-refresh"),
        };
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
