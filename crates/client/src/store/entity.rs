//! Generic entity store: one mirrored collection plus its CRUD actions.
//!
//! Every mutation is followed by a full re-fetch of the collection instead of
//! patching the changed record locally, so after any successful action the
//! in-memory view matches what the server returned.

use std::fmt;
use std::sync::Arc;

use recipe_box_core::{
    Category, CategoryId, Ingredient, IngredientId, Notification, NotificationId, Nutrition,
    NutritionId, Order, OrderId, User, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::sequence::{SequenceGuard, Ticket};
use crate::error::{ClientError, Result};
use crate::gateway::{GatewayError, RemoteGateway, decode, encode};

/// A record type served as a REST collection.
pub trait Entity: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection path, e.g. `"ingredients"`.
    const RESOURCE: &'static str;

    type Id: fmt::Display + PartialEq + Send + Sync;

    fn id(&self) -> &Self::Id;
}

macro_rules! impl_entity {
    ($entity:ty, $id:ty, $resource:literal) => {
        impl Entity for $entity {
            const RESOURCE: &'static str = $resource;
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

impl_entity!(Ingredient, IngredientId, "ingredients");
impl_entity!(Nutrition, NutritionId, "nutrition");
impl_entity!(Category, CategoryId, "categories");
impl_entity!(User, UserId, "users");
impl_entity!(Notification, NotificationId, "notifications");
impl_entity!(Order, OrderId, "orders");

/// Point-in-time copy of an entity store's state.
#[derive(Debug, Clone)]
pub struct EntitySnapshot<E> {
    pub items: Vec<E>,
    pub active: Option<E>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
struct EntityState<E> {
    items: Vec<E>,
    active: Option<E>,
    in_flight: usize,
    error: Option<String>,
}

impl<E> Default for EntityState<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            active: None,
            in_flight: 0,
            error: None,
        }
    }
}

/// In-memory mirror of one backend collection.
pub struct EntityStore<E: Entity> {
    gateway: Arc<dyn RemoteGateway>,
    state: RwLock<EntityState<E>>,
    list_seq: SequenceGuard,
    active_seq: SequenceGuard,
}

impl<E: Entity> EntityStore<E> {
    /// Create an empty store.
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(EntityState::default()),
            list_seq: SequenceGuard::new(),
            active_seq: SequenceGuard::new(),
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Replace the collection with a fresh server listing.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous collection is kept.
    #[instrument(skip(self), fields(resource = E::RESOURCE))]
    pub async fn get_all(&self) -> Result<()> {
        let ticket = self.list_seq.issue();
        self.begin().await;
        let result = self
            .gateway
            .get(E::RESOURCE, &[])
            .await
            .and_then(decode::<Vec<E>>);
        self.finish(&self.list_seq, ticket, result, |state, items| {
            state.items = items;
        })
        .await
    }

    /// Load one record into the active slot.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous active record is kept.
    #[instrument(skip(self, id), fields(resource = E::RESOURCE, id = %id))]
    pub async fn get_by_id(&self, id: &E::Id) -> Result<()> {
        let ticket = self.active_seq.issue();
        self.begin().await;
        let path = format!("{}/{id}", E::RESOURCE);
        let result = self.gateway.get(&path, &[]).await.and_then(decode::<E>);
        self.finish(&self.active_seq, ticket, result, |state, item| {
            state.active = Some(item);
        })
        .await
    }

    /// Create a record, then re-fetch the collection.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either the create or the re-fetch.
    #[instrument(skip(self, body), fields(resource = E::RESOURCE))]
    pub async fn create<B: Serialize + Sync + ?Sized>(&self, body: &B) -> Result<()> {
        self.begin().await;
        let result: std::result::Result<Value, GatewayError> =
            async { self.gateway.post(E::RESOURCE, encode(body)?).await }.await;
        self.after_mutation(result).await
    }

    /// Update a record, then re-fetch the collection.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either the update or the re-fetch.
    #[instrument(skip(self, id, body), fields(resource = E::RESOURCE, id = %id))]
    pub async fn update<B: Serialize + Sync + ?Sized>(&self, id: &E::Id, body: &B) -> Result<()> {
        self.begin().await;
        let path = format!("{}/{id}", E::RESOURCE);
        let result: std::result::Result<Value, GatewayError> =
            async { self.gateway.put(&path, encode(body)?).await }.await;
        self.after_mutation(result).await
    }

    /// Delete a record, then re-fetch the collection.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either the delete or the re-fetch.
    #[instrument(skip(self, id), fields(resource = E::RESOURCE, id = %id))]
    pub async fn delete(&self, id: &E::Id) -> Result<()> {
        self.begin().await;
        let path = format!("{}/{id}", E::RESOURCE);
        let result = self.gateway.delete(&path).await;
        self.after_mutation(result).await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Copy of the collection.
    pub async fn items(&self) -> Vec<E> {
        self.state.read().await.items.clone()
    }

    /// Copy of the active record.
    pub async fn active(&self) -> Option<E> {
        self.state.read().await.active.clone()
    }

    /// Find a record in the collection by id.
    pub async fn find(&self, id: &E::Id) -> Option<E> {
        self.state
            .read()
            .await
            .items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    /// Whether any action is still waiting on the backend.
    pub async fn is_loading(&self) -> bool {
        self.state.read().await.in_flight > 0
    }

    /// Message of the last failed action, cleared by the next success.
    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> EntitySnapshot<E> {
        let state = self.state.read().await;
        EntitySnapshot {
            items: state.items.clone(),
            active: state.active.clone(),
            loading: state.in_flight > 0,
            error: state.error.clone(),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn begin(&self) {
        let mut state = self.state.write().await;
        state.in_flight += 1;
        state.error = None;
    }

    async fn finish<T>(
        &self,
        guard: &SequenceGuard,
        ticket: Ticket,
        result: std::result::Result<T, GatewayError>,
        apply: impl FnOnce(&mut EntityState<E>, T) + Send,
    ) -> Result<()>
    where
        T: Send,
    {
        let mut state = self.state.write().await;
        state.in_flight = state.in_flight.saturating_sub(1);

        if !guard.is_latest(ticket) {
            debug!(%ticket, resource = E::RESOURCE, "Discarding stale response");
            return result.map(|_| ()).map_err(ClientError::from);
        }

        match result {
            Ok(value) => {
                apply(&mut state, value);
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, resource = E::RESOURCE, "Fetch failed");
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn after_mutation(&self, result: std::result::Result<Value, GatewayError>) -> Result<()> {
        match result {
            Ok(_) => {
                let mut state = self.state.write().await;
                state.in_flight = state.in_flight.saturating_sub(1);
                drop(state);
                self.get_all().await
            }
            Err(e) => {
                warn!(error = %e, resource = E::RESOURCE, "Mutation failed");
                let mut state = self.state.write().await;
                state.in_flight = state.in_flight.saturating_sub(1);
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}

impl EntityStore<Notification> {
    /// Number of unread notifications in the collection.
    pub async fn unread_count(&self) -> usize {
        self.state
            .read()
            .await
            .items
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    /// Mark a notification as read, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either the update or the re-fetch.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        self.update(id, &json!({ "read": true })).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::gateway::mock::MockGateway;

    fn store(gateway: &Arc<MockGateway>) -> EntityStore<Ingredient> {
        EntityStore::new(Arc::clone(gateway) as Arc<dyn RemoteGateway>)
    }

    fn names(items: &[Ingredient]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_all_replaces_collection() {
        let gateway = Arc::new(MockGateway::new());
        gateway.respond(
            "GET",
            "ingredients",
            json!([{"id": "i1", "name": "Flour", "unit": "g"}]),
        );
        let store = store(&gateway);

        store.get_all().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(names(&snapshot.items), ["Flour"]);
        assert!(!snapshot.loading);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_preserves_collection() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond("GET", "ingredients", json!([{"id": "i1", "name": "Flour"}]))
            .fail_status("GET", "ingredients", 503, "maintenance");
        let store = store(&gateway);

        store.get_all().await.unwrap();
        let err = store.get_all().await.unwrap_err();

        assert!(err.to_string().contains("maintenance"));
        let snapshot = store.snapshot().await;
        assert_eq!(names(&snapshot.items), ["Flour"]);
        assert!(!snapshot.loading);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("API error: 503 - maintenance")
        );
    }

    #[tokio::test]
    async fn test_create_refetches_server_listing() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond("POST", "ingredients", json!({"id": "srv-7", "name": "Sugar"}))
            .respond(
                "GET",
                "ingredients",
                json!({"result": [
                    {"id": "i1", "name": "Flour"},
                    {"id": "srv-7", "name": "Sugar", "unit": "g", "price": 2.5}
                ]}),
            );
        let store = store(&gateway);

        store
            .create(&json!({"name": "Sugar", "unit": "g"}))
            .await
            .unwrap();

        let items = store.items().await;
        assert_eq!(names(&items), ["Flour", "Sugar"]);
        assert_eq!(items[1].id.as_str(), "srv-7");
        assert!(items[1].price.is_some());

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].method, calls[0].path.as_str()), ("POST", "ingredients"));
        assert_eq!((calls[1].method, calls[1].path.as_str()), ("GET", "ingredients"));
    }

    #[tokio::test]
    async fn test_failed_mutation_skips_refetch_and_keeps_state() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond("GET", "ingredients", json!([{"id": "i1", "name": "Flour"}]))
            .fail_status("DELETE", "ingredients/i1", 403, "forbidden");
        let store = store(&gateway);
        store.get_all().await.unwrap();

        let result = store.delete(&IngredientId::new("i1")).await;

        assert!(result.is_err());
        assert_eq!(names(&store.items().await), ["Flour"]);
        assert_eq!(gateway.calls_to("GET", "ingredients").len(), 1);
        assert!(!store.is_loading().await);
        assert!(store.error().await.is_some());
    }

    #[tokio::test]
    async fn test_update_puts_then_refetches() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond("PUT", "ingredients/i1", Value::Null)
            .respond("GET", "ingredients", json!([{"id": "i1", "name": "Rye flour"}]));
        let store = store(&gateway);

        store
            .update(&IngredientId::new("i1"), &json!({"name": "Rye flour"}))
            .await
            .unwrap();

        assert_eq!(names(&store.items().await), ["Rye flour"]);
        let put = &gateway.calls_to("PUT", "ingredients/i1")[0];
        assert_eq!(put.body, Some(json!({"name": "Rye flour"})));
    }

    #[tokio::test]
    async fn test_get_by_id_fills_active_slot_only() {
        let gateway = Arc::new(MockGateway::new());
        gateway.respond("GET", "ingredients/i9", json!({"id": "i9", "name": "Yeast"}));
        let store = store(&gateway);

        store.get_by_id(&IngredientId::new("i9")).await.unwrap();

        assert_eq!(store.active().await.unwrap().name, "Yeast");
        assert!(store.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond_after(
                "GET",
                "ingredients",
                Duration::from_millis(200),
                json!([{"id": "old", "name": "Stale"}]),
            )
            .respond("GET", "ingredients", json!([{"id": "new", "name": "Fresh"}]));
        let store = store(&gateway);

        let (slow, fast) = tokio::join!(store.get_all(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.get_all().await
        });

        assert!(slow.is_ok());
        assert!(fast.is_ok());
        assert_eq!(names(&store.items().await), ["Fresh"]);
        assert!(!store.is_loading().await);
    }

    #[tokio::test]
    async fn test_notifications_unread_and_mark_read() {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .respond(
                "GET",
                "notifications",
                json!([
                    {"id": "n1", "title": "Order shipped", "read": false},
                    {"id": "n2", "title": "Welcome", "read": true}
                ]),
            )
            .respond(
                "GET",
                "notifications",
                json!([
                    {"id": "n1", "title": "Order shipped", "read": true},
                    {"id": "n2", "title": "Welcome", "read": true}
                ]),
            )
            .respond("PUT", "notifications/n1", Value::Null);
        let store: EntityStore<Notification> =
            EntityStore::new(Arc::clone(&gateway) as Arc<dyn RemoteGateway>);

        store.get_all().await.unwrap();
        assert_eq!(store.unread_count().await, 1);

        store.mark_read(&NotificationId::new("n1")).await.unwrap();
        assert_eq!(store.unread_count().await, 0);
        assert_eq!(
            gateway.calls_to("PUT", "notifications/n1")[0].body,
            Some(json!({"read": true}))
        );
    }
}
