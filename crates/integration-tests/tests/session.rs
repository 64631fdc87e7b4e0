//! Login, logout and session restore against the in-process backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use recipe_box_client::storage::{FileStore, KeyValueStore, keys};
use recipe_box_client::store::{AuthStatus, Credentials, Registration};
use recipe_box_client::{AppState, HttpGateway};
use recipe_box_core::{CartLine, Email};
use recipe_box_integration_tests::TestBackend;

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials::new(Email::parse(email).expect("valid email"), password)
}

#[tokio::test]
async fn login_survives_restart() {
    let backend = TestBackend::start().await;
    let user_id = backend.add_user("cook@example.com", "hunter2");
    let dir = tempfile::tempdir().expect("tempdir");

    let state = backend.app_state(dir.path()).await;
    let logged_in = state
        .auth()
        .login(&credentials("cook@example.com", "hunter2"))
        .await
        .expect("login");
    assert!(logged_in);
    assert_eq!(state.auth().status().await, AuthStatus::LoggedIn);
    drop(state);

    let restarted = backend.app_state(dir.path()).await;
    assert!(restarted.auth().is_logged_in().await);
    assert_eq!(
        restarted.auth().user_id().await.map(|id| id.to_string()),
        Some(user_id)
    );

    // The restored token authenticates requests
    restarted
        .recipes()
        .get_favorite_recipes()
        .await
        .expect("favorites with restored token");
}

#[tokio::test]
async fn rejected_login_leaves_nothing_behind() {
    let backend = TestBackend::start().await;
    backend.add_user("cook@example.com", "hunter2");
    let dir = tempfile::tempdir().expect("tempdir");
    let state = backend.app_state(dir.path()).await;

    let logged_in = state
        .auth()
        .login(&credentials("cook@example.com", "wrong"))
        .await
        .expect("login call");

    assert!(!logged_in);
    assert_eq!(state.auth().status().await, AuthStatus::LoggedOut);
    assert_eq!(
        state.auth().error().await.as_deref(),
        Some("Unauthorized: Invalid credentials")
    );
    for key in keys::AUTH_ALL {
        assert_eq!(state.storage().get_item(key).await.expect("read"), None);
    }
}

#[tokio::test]
async fn logout_keeps_cart_and_theme() {
    let backend = TestBackend::start().await;
    backend.add_user("cook@example.com", "hunter2");
    let dir = tempfile::tempdir().expect("tempdir");
    let state = backend.app_state(dir.path()).await;

    state
        .auth()
        .login(&credentials("cook@example.com", "hunter2"))
        .await
        .expect("login");
    state
        .cart()
        .add_to_cart(CartLine::new("flour", "Flour", 1.0, "kg"))
        .await
        .expect("add");
    state.theme().toggle().await.expect("toggle");

    state.auth().logout().await.expect("logout");

    let restarted = backend.app_state(dir.path()).await;
    assert!(!restarted.auth().is_logged_in().await);
    assert_eq!(restarted.cart().get_total_items().await, 1);
    assert_eq!(restarted.theme().theme().await.to_string(), "dark");

    let err = restarted
        .recipes()
        .get_favorite_recipes()
        .await
        .expect_err("favorites need a session");
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn register_logs_in() {
    let backend = TestBackend::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let state = backend.app_state(dir.path()).await;
    let registration = Registration {
        name: Some("New Cook".to_string()),
        credentials: credentials("new@example.com", "s3cret"),
    };

    assert!(state.auth().register(&registration).await.expect("register"));
    assert!(state.auth().is_logged_in().await);

    // Registering the same email again is refused by the backend
    assert!(!state.auth().register(&registration).await.expect("register"));
    assert!(
        state
            .auth()
            .error()
            .await
            .is_some_and(|e| e.contains("Email already registered"))
    );
}

#[tokio::test]
async fn expired_session_fires_unauthorized_hook() {
    let backend = TestBackend::start().await;
    backend.add_user("cook@example.com", "hunter2");
    let dir = tempfile::tempdir().expect("tempdir");

    let gateway = HttpGateway::new(&backend.api_config()).expect("gateway");
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    gateway.set_unauthorized_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path().join("state.json")));
    let state = AppState::new(Arc::new(gateway), storage)
        .await
        .expect("state");

    state
        .auth()
        .login(&credentials("cook@example.com", "hunter2"))
        .await
        .expect("login");
    backend.expire_sessions();

    let err = state
        .recipes()
        .get_my_recipes()
        .await
        .expect_err("expired token");

    assert!(err.is_unauthorized());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(state.recipes().error().await.is_some());
    // The store does not log out on its own
    assert!(state.auth().is_logged_in().await);
}
