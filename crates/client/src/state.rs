//! Application state: every store, shared behind one handle.

use std::sync::Arc;

use recipe_box_core::{Category, Ingredient, Notification, Nutrition, Order, User};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::gateway::{HttpGateway, RemoteGateway};
use crate::storage::{FileStore, KeyValueStore};
use crate::store::{AuthStore, CartStore, EntityStore, RecipeStore, SearchStore, ThemeStore};

/// Application state shared across the UI layer.
///
/// Cheaply cloneable via `Arc`; clones see the same stores.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn KeyValueStore>,
    auth: AuthStore,
    cart: CartStore,
    theme: ThemeStore,
    recipes: RecipeStore,
    search: SearchStore,
    ingredients: EntityStore<Ingredient>,
    nutrition: EntityStore<Nutrition>,
    categories: EntityStore<Category>,
    users: EntityStore<User>,
    notifications: EntityStore<Notification>,
    orders: EntityStore<Order>,
}

impl AppState {
    /// Build every store and load persisted state: the cart, the theme and
    /// any complete saved session.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the saved session could not be read.
    pub async fn new(gateway: Arc<dyn RemoteGateway>, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let auth = AuthStore::new(Arc::clone(&gateway), Arc::clone(&storage));
        if auth.restore().await? {
            info!("Resumed saved session");
        }
        let cart = CartStore::load(Arc::clone(&gateway), Arc::clone(&storage)).await;
        let theme = ThemeStore::load(Arc::clone(&storage)).await;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                auth,
                cart,
                theme,
                recipes: RecipeStore::new(Arc::clone(&gateway)),
                search: SearchStore::new(Arc::clone(&gateway)),
                ingredients: EntityStore::new(Arc::clone(&gateway)),
                nutrition: EntityStore::new(Arc::clone(&gateway)),
                categories: EntityStore::new(Arc::clone(&gateway)),
                users: EntityStore::new(Arc::clone(&gateway)),
                notifications: EntityStore::new(Arc::clone(&gateway)),
                orders: EntityStore::new(Arc::clone(&gateway)),
                gateway,
                storage,
            }),
        })
    }

    /// Build state on the HTTP gateway and the file-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be built or the saved session
    /// cannot be read.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let gateway = HttpGateway::new(&config.api)?;
        gateway.set_unauthorized_hook(|| warn!("Session rejected by backend, log in again"));
        let storage = FileStore::new(&config.storage_path);
        Self::new(Arc::new(gateway), Arc::new(storage)).await
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.inner.gateway
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.storage
    }

    #[must_use]
    pub fn auth(&self) -> &AuthStore {
        &self.inner.auth
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn theme(&self) -> &ThemeStore {
        &self.inner.theme
    }

    #[must_use]
    pub fn recipes(&self) -> &RecipeStore {
        &self.inner.recipes
    }

    #[must_use]
    pub fn search(&self) -> &SearchStore {
        &self.inner.search
    }

    #[must_use]
    pub fn ingredients(&self) -> &EntityStore<Ingredient> {
        &self.inner.ingredients
    }

    #[must_use]
    pub fn nutrition(&self) -> &EntityStore<Nutrition> {
        &self.inner.nutrition
    }

    #[must_use]
    pub fn categories(&self) -> &EntityStore<Category> {
        &self.inner.categories
    }

    #[must_use]
    pub fn users(&self) -> &EntityStore<User> {
        &self.inner.users
    }

    #[must_use]
    pub fn notifications(&self) -> &EntityStore<Notification> {
        &self.inner.notifications
    }

    #[must_use]
    pub fn orders(&self) -> &EntityStore<Order> {
        &self.inner.orders
    }
}
