//! Cart store: the [`CartState`] reducer plus persistence and checkout.

use std::sync::Arc;

use recipe_box_core::{CartLine, CartState, IngredientId, Order};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ClientError, Result};
use crate::gateway::{RemoteGateway, decode};
use crate::storage::{KeyValueStore, keys, load_json, save_json};

#[derive(Debug, Default)]
struct CartInner {
    cart: CartState,
    error: Option<String>,
}

/// The shopping cart, persisted under [`keys::CART`] after every change.
pub struct CartStore {
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn KeyValueStore>,
    // Held across the storage write so persisted snapshots never interleave.
    inner: Mutex<CartInner>,
}

impl CartStore {
    /// Load the persisted cart. An absent, unreadable or malformed value
    /// yields an empty cart.
    pub async fn load(gateway: Arc<dyn RemoteGateway>, storage: Arc<dyn KeyValueStore>) -> Self {
        let cart = match load_json::<CartState>(storage.as_ref(), keys::CART).await {
            Ok(Some(cart)) => {
                debug!(lines = cart.total_items(), "Restored cart");
                cart
            }
            Ok(None) => CartState::default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted cart");
                CartState::default()
            }
        };

        Self {
            gateway,
            storage,
            inner: Mutex::new(CartInner { cart, error: None }),
        }
    }

    /// Add a line, merging quantities with an existing line for the same
    /// ingredient.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidQuantity`] for a NaN or infinite
    /// quantity, leaving the cart untouched. Returns the storage error if the
    /// cart could not be persisted; the in-memory change is kept.
    #[instrument(skip(self, line), fields(ingredient_id = %line.ingredient_id, quantity = line.quantity))]
    pub async fn add_to_cart(&self, line: CartLine) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.cart.try_add(line) {
            warn!(error = %e, "Rejected cart line");
            inner.error = Some(e.to_string());
            return Err(e.into());
        }
        self.persist(&mut inner).await
    }

    /// Remove the line for `ingredient_id`. Absent ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart could not be persisted.
    #[instrument(skip(self, ingredient_id), fields(ingredient_id = %ingredient_id))]
    pub async fn remove_from_cart(&self, ingredient_id: &IngredientId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.cart.remove(ingredient_id) {
            debug!("Ingredient not in cart");
        }
        self.persist(&mut inner).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart could not be persisted.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cart.clear();
        self.persist(&mut inner).await
    }

    /// Place an order for the current cart.
    ///
    /// On success the cart is cleared and the created order returned. On
    /// failure the cart is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCart`] without calling the backend when
    /// there is nothing to order, or the gateway error.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        if inner.cart.is_empty() {
            inner.error = Some(ClientError::EmptyCart.to_string());
            return Err(ClientError::EmptyCart);
        }

        let body = json!({ "lines": inner.cart.lines() });
        let order = match self.gateway.post("orders", body).await.and_then(decode::<Order>) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Checkout failed");
                inner.error = Some(e.to_string());
                return Err(e.into());
            }
        };

        info!(order_id = %order.id, lines = inner.cart.total_items(), "Order placed");
        inner.cart.clear();
        // The order exists server-side; a failed write only leaves a stale cart on disk.
        if let Err(e) = self.persist(&mut inner).await {
            error!(error = %e, order_id = %order.id, "Order placed but cart not persisted");
        }
        Ok(order)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of distinct lines.
    pub async fn get_total_items(&self) -> usize {
        self.inner.lock().await.cart.total_items()
    }

    /// Sum of all line quantities.
    pub async fn total_quantity(&self) -> f64 {
        self.inner.lock().await.cart.total_quantity()
    }

    /// Sum of priced line totals; `None` if it overflows.
    pub async fn subtotal(&self) -> Option<Decimal> {
        self.inner.lock().await.cart.subtotal()
    }

    /// Copy of the cart lines, in insertion order.
    pub async fn lines(&self) -> Vec<CartLine> {
        self.inner.lock().await.cart.lines().to_vec()
    }

    /// Copy of the whole cart.
    pub async fn cart(&self) -> CartState {
        self.inner.lock().await.cart.clone()
    }

    /// Message of the last failed action.
    pub async fn error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    async fn persist(&self, inner: &mut MutexGuard<'_, CartInner>) -> Result<()> {
        match save_json(self.storage.as_ref(), keys::CART, &inner.cart).await {
            Ok(()) => {
                inner.error = None;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to persist cart");
                inner.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}
