//! Recipe store: browse results, the open recipe, the user's own recipes and
//! their favorites.
//!
//! The four collections are fetched independently and each has its own
//! [`SequenceGuard`]. Mutations re-fetch the collection they affect:
//! favorites after a favorite toggle, `my_recipes` after a create, update or
//! delete.

use std::sync::Arc;

use recipe_box_core::{CategoryId, NewRecipe, Recipe, RecipeId};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::sequence::{SequenceGuard, Ticket};
use crate::error::{ClientError, Result};
use crate::gateway::{GatewayError, ImageUpload, MultipartUpload, RemoteGateway, decode, encode};

/// Server-side filter for [`RecipeStore::get_recipes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
}

impl RecipeFilter {
    /// Filter by free-text search only.
    #[must_use]
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            search: Some(query.into()),
            category_id: None,
        }
    }

    /// Query parameters; blank values are omitted.
    fn query(&self) -> Vec<(&'static str, &str)> {
        let mut query = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim)
            && !search.is_empty()
        {
            query.push(("search", search));
        }
        if let Some(category_id) = &self.category_id {
            query.push(("categoryId", category_id.as_str()));
        }
        query
    }
}

/// Point-in-time copy of the recipe store.
#[derive(Debug, Clone, Default)]
pub struct RecipeSnapshot {
    pub recipes: Vec<Recipe>,
    pub active_recipe: Option<Recipe>,
    pub my_recipes: Vec<Recipe>,
    pub favorite_recipes: Vec<Recipe>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct RecipeState {
    recipes: Vec<Recipe>,
    active_recipe: Option<Recipe>,
    my_recipes: Vec<Recipe>,
    favorite_recipes: Vec<Recipe>,
    in_flight: usize,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct Guards {
    recipes: SequenceGuard,
    active: SequenceGuard,
    mine: SequenceGuard,
    favorites: SequenceGuard,
}

/// Recipes and favorites mirrored from the backend.
pub struct RecipeStore {
    gateway: Arc<dyn RemoteGateway>,
    state: RwLock<RecipeState>,
    guards: Guards,
}

impl RecipeStore {
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(RecipeState::default()),
            guards: Guards::default(),
        }
    }

    // =========================================================================
    // Fetches
    // =========================================================================

    /// Load browse results, optionally filtered server-side.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; previous results are kept.
    #[instrument(skip(self))]
    pub async fn get_recipes(&self, filter: &RecipeFilter) -> Result<()> {
        let query = filter.query();
        self.fetch(&self.guards.recipes, "recipes", &query, |state, recipes| {
            state.recipes = recipes;
        })
        .await
    }

    /// Load one recipe into the active slot.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous active recipe is kept.
    #[instrument(skip(self, id), fields(recipe_id = %id))]
    pub async fn get_recipe_by_id(&self, id: &RecipeId) -> Result<()> {
        let path = format!("recipes/{id}");
        self.fetch(&self.guards.active, &path, &[], |state, recipe| {
            state.active_recipe = Some(recipe);
        })
        .await
    }

    /// Load the recipes authored by the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous list is kept.
    #[instrument(skip(self))]
    pub async fn get_my_recipes(&self) -> Result<()> {
        self.fetch(&self.guards.mine, "recipes/mine", &[], |state, recipes| {
            state.my_recipes = recipes;
        })
        .await
    }

    /// Load the logged-in user's favorites.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the previous list is kept.
    #[instrument(skip(self))]
    pub async fn get_favorite_recipes(&self) -> Result<()> {
        self.fetch(&self.guards.favorites, "favorites", &[], |state, recipes| {
            state.favorite_recipes = recipes;
        })
        .await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Mark a recipe as favorite, then re-fetch favorites.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either call.
    #[instrument(skip(self, id), fields(recipe_id = %id))]
    pub async fn add_favorite_recipe(&self, id: &RecipeId) -> Result<()> {
        self.begin().await;
        let result = self.gateway.post(&format!("favorites/{id}"), json!({})).await;
        self.settle(result).await?;
        self.get_favorite_recipes().await
    }

    /// Unmark a favorite, then re-fetch favorites.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either call.
    #[instrument(skip(self, id), fields(recipe_id = %id))]
    pub async fn remove_favorite_recipe(&self, id: &RecipeId) -> Result<()> {
        self.begin().await;
        let result = self.gateway.delete(&format!("favorites/{id}")).await;
        self.settle(result).await?;
        self.get_favorite_recipes().await
    }

    /// Create a recipe, as multipart form-data when an image is attached,
    /// then re-fetch `my_recipes`.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either call.
    #[instrument(skip(self, recipe, image), fields(title = %recipe.title, has_image = image.is_some()))]
    pub async fn create_recipe(&self, recipe: &NewRecipe, image: Option<ImageUpload>) -> Result<()> {
        self.begin().await;
        let result: std::result::Result<Value, GatewayError> = async move {
            let data = encode(recipe)?;
            match image {
                Some(image) => {
                    let upload = MultipartUpload {
                        data,
                        image: Some(image),
                    };
                    self.gateway.post_multipart("recipes", upload).await
                }
                None => self.gateway.post("recipes", data).await,
            }
        }
        .await;
        self.settle(result).await?;
        self.get_my_recipes().await
    }

    /// Replace a recipe, then re-fetch `my_recipes`.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either call.
    #[instrument(skip(self, id, recipe), fields(recipe_id = %id))]
    pub async fn update_recipe(&self, id: &RecipeId, recipe: &NewRecipe) -> Result<()> {
        self.begin().await;
        let path = format!("recipes/{id}");
        let result: std::result::Result<Value, GatewayError> =
            async { self.gateway.put(&path, encode(recipe)?).await }.await;
        self.settle(result).await?;
        self.get_my_recipes().await
    }

    /// Delete a recipe, then re-fetch `my_recipes`.
    ///
    /// # Errors
    ///
    /// Returns the gateway error from either call.
    #[instrument(skip(self, id), fields(recipe_id = %id))]
    pub async fn delete_recipe(&self, id: &RecipeId) -> Result<()> {
        self.begin().await;
        let result = self.gateway.delete(&format!("recipes/{id}")).await;
        self.settle(result).await?;
        self.get_my_recipes().await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether `id` is among the loaded favorites.
    pub async fn is_favorite(&self, id: &RecipeId) -> bool {
        self.state
            .read()
            .await
            .favorite_recipes
            .iter()
            .any(|recipe| &recipe.id == id)
    }

    pub async fn recipes(&self) -> Vec<Recipe> {
        self.state.read().await.recipes.clone()
    }

    pub async fn active_recipe(&self) -> Option<Recipe> {
        self.state.read().await.active_recipe.clone()
    }

    pub async fn my_recipes(&self) -> Vec<Recipe> {
        self.state.read().await.my_recipes.clone()
    }

    pub async fn favorite_recipes(&self) -> Vec<Recipe> {
        self.state.read().await.favorite_recipes.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.in_flight > 0
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> RecipeSnapshot {
        let state = self.state.read().await;
        RecipeSnapshot {
            recipes: state.recipes.clone(),
            active_recipe: state.active_recipe.clone(),
            my_recipes: state.my_recipes.clone(),
            favorite_recipes: state.favorite_recipes.clone(),
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

    async fn fetch<T>(
        &self,
        guard: &SequenceGuard,
        path: &str,
        query: &[(&str, &str)],
        apply: impl FnOnce(&mut RecipeState, T) + Send,
    ) -> Result<()>
    where
        T: DeserializeOwned + Send,
    {
        let ticket = guard.issue();
        self.begin().await;
        let result = self.gateway.get(path, query).await.and_then(decode::<T>);
        self.commit(guard, ticket, path, result, apply).await
    }

    async fn commit<T>(
        &self,
        guard: &SequenceGuard,
        ticket: Ticket,
        path: &str,
        result: std::result::Result<T, GatewayError>,
        apply: impl FnOnce(&mut RecipeState, T) + Send,
    ) -> Result<()>
    where
        T: Send,
    {
        let mut state = self.state.write().await;
        state.in_flight = state.in_flight.saturating_sub(1);

        if !guard.is_latest(ticket) {
            debug!(%ticket, path, "Discarding stale response");
            return result.map(|_| ()).map_err(ClientError::from);
        }

        match result {
            Ok(value) => {
                apply(&mut state, value);
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, path, "Fetch failed");
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Record the outcome of a mutation call.
    async fn settle(&self, result: std::result::Result<Value, GatewayError>) -> Result<()> {
        let mut state = self.state.write().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Mutation failed");
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::mock::MockGateway;

    fn setup() -> (Arc<MockGateway>, RecipeStore) {
        let gateway = Arc::new(MockGateway::new());
        let store = RecipeStore::new(Arc::clone(&gateway) as Arc<dyn RemoteGateway>);
        (gateway, store)
    }

    fn titles(recipes: &[Recipe]) -> Vec<&str> {
        recipes.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_filter_query_skips_blank_values() {
        assert!(RecipeFilter::default().query().is_empty());
        assert!(RecipeFilter::search("   ").query().is_empty());

        let filter = RecipeFilter {
            search: Some(" soup ".to_string()),
            category_id: Some(CategoryId::new("c2")),
        };
        assert_eq!(filter.query(), [("search", "soup"), ("categoryId", "c2")]);
    }

    #[tokio::test]
    async fn test_get_recipes_sends_filter() {
        let (gateway, store) = setup();
        gateway.respond("GET", "recipes", json!({"result": [{"id": "r1", "title": "Soup"}]}));

        store.get_recipes(&RecipeFilter::search("soup")).await.unwrap();

        assert_eq!(titles(&store.recipes().await), ["Soup"]);
        let call = &gateway.calls_to("GET", "recipes")[0];
        assert_eq!(call.query, [("search".to_string(), "soup".to_string())]);
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let (gateway, store) = setup();
        gateway
            .respond("GET", "recipes", json!([{"id": "r1", "title": "Soup"}]))
            .respond("GET", "recipes/mine", json!([{"id": "r2", "title": "Bread"}]))
            .respond("GET", "recipes/r3", json!({"id": "r3", "title": "Pie"}));

        store.get_recipes(&RecipeFilter::default()).await.unwrap();
        store.get_my_recipes().await.unwrap();
        store.get_recipe_by_id(&RecipeId::new("r3")).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(titles(&snapshot.recipes), ["Soup"]);
        assert_eq!(titles(&snapshot.my_recipes), ["Bread"]);
        assert_eq!(snapshot.active_recipe.unwrap().title, "Pie");
        assert!(snapshot.favorite_recipes.is_empty());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_favorite_toggle_refetches_unconditionally() {
        let (gateway, store) = setup();
        gateway
            .respond("POST", "favorites/r1", Value::Null)
            .respond("GET", "favorites", json!([{"id": "r1", "title": "Soup"}]))
            .respond("GET", "favorites", json!([]))
            .respond("DELETE", "favorites/r1", Value::Null);
        let id = RecipeId::new("r1");

        store.add_favorite_recipe(&id).await.unwrap();
        assert!(store.is_favorite(&id).await);

        store.remove_favorite_recipe(&id).await.unwrap();
        assert!(!store.is_favorite(&id).await);

        let methods: Vec<_> = gateway
            .calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect();
        assert_eq!(
            methods,
            [
                "POST favorites/r1",
                "GET favorites",
                "DELETE favorites/r1",
                "GET favorites"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_favorite_keeps_list() {
        let (gateway, store) = setup();
        gateway
            .respond("GET", "favorites", json!([{"id": "r1", "title": "Soup"}]))
            .fail_network("POST", "favorites/r2", "connection reset");
        store.get_favorite_recipes().await.unwrap();

        let result = store.add_favorite_recipe(&RecipeId::new("r2")).await;

        assert!(result.is_err());
        assert_eq!(titles(&store.favorite_recipes().await), ["Soup"]);
        assert_eq!(
            store.error().await.as_deref(),
            Some("Network error: connection reset")
        );
        assert!(!store.is_loading().await);
    }

    #[tokio::test]
    async fn test_create_without_image_posts_json() {
        let (gateway, store) = setup();
        gateway
            .respond("POST", "recipes", json!({"id": "srv-1", "title": "Stew"}))
            .respond("GET", "recipes/mine", json!([{"id": "srv-1", "title": "Stew"}]));
        let recipe = NewRecipe {
            title: "Stew".to_string(),
            ..NewRecipe::default()
        };

        store.create_recipe(&recipe, None).await.unwrap();

        let post = &gateway.calls_to("POST", "recipes")[0];
        assert_eq!(post.body.as_ref().unwrap()["title"], "Stew");
        assert!(post.multipart.is_none());
        assert_eq!(store.my_recipes().await[0].id.as_str(), "srv-1");
    }

    #[tokio::test]
    async fn test_create_with_image_posts_multipart() {
        let (gateway, store) = setup();
        gateway
            .respond("POST", "recipes", json!({"id": "srv-2", "title": "Cake"}))
            .respond("GET", "recipes/mine", json!([{"id": "srv-2", "title": "Cake"}]));
        let recipe = NewRecipe {
            title: "Cake".to_string(),
            ..NewRecipe::default()
        };
        let image = ImageUpload {
            file_name: "cake.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        };

        store.create_recipe(&recipe, Some(image.clone())).await.unwrap();

        let post = &gateway.calls_to("POST", "recipes")[0];
        assert!(post.body.is_none());
        let upload = post.multipart.as_ref().unwrap();
        assert_eq!(upload.data["title"], "Cake");
        assert_eq!(upload.image.as_ref(), Some(&image));
    }

    #[tokio::test]
    async fn test_update_and_delete_refetch_my_recipes() {
        let (gateway, store) = setup();
        gateway
            .respond("PUT", "recipes/r1", Value::Null)
            .respond("DELETE", "recipes/r1", Value::Null)
            .respond("GET", "recipes/mine", json!([{"id": "r1", "title": "Soup v2"}]))
            .respond("GET", "recipes/mine", json!([]));
        let id = RecipeId::new("r1");
        let update = NewRecipe {
            title: "Soup v2".to_string(),
            ..NewRecipe::default()
        };

        store.update_recipe(&id, &update).await.unwrap();
        assert_eq!(titles(&store.my_recipes().await), ["Soup v2"]);

        store.delete_recipe(&id).await.unwrap();
        assert!(store.my_recipes().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_search_does_not_overwrite_newer() {
        let (gateway, store) = setup();
        gateway
            .respond_after(
                "GET",
                "recipes",
                Duration::from_millis(200),
                json!([{"id": "r1", "title": "Old"}]),
            )
            .respond("GET", "recipes", json!([{"id": "r2", "title": "New"}]));

        let slow = RecipeFilter::search("s");
        let fast = RecipeFilter::search("soup");
        let (first, second) = tokio::join!(store.get_recipes(&slow), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.get_recipes(&fast).await
        });

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(titles(&store.recipes().await), ["New"]);
    }
}
