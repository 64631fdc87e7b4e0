//! Integration tests for Recipe Box.
//!
//! [`TestBackend`] is an in-memory implementation of the Recipe Box REST API
//! served by `axum` on `127.0.0.1:0`. Tests point a real
//! [`HttpGateway`](recipe_box_client::HttpGateway) at it, so requests go
//! through `reqwest`, headers, status handling and envelope unwrapping exactly
//! as they would against the production backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p recipe-box-integration-tests
//! ```
//!
//! # Backend behaviour
//!
//! - `auth/login` answers `{ "result": session }`; unknown credentials get 401
//! - `recipes` listings answer with a bare array, single records with the
//!   `{ "result": .. }` envelope, so both shapes are exercised
//! - `favorites`, `recipes/mine` and `orders` require a bearer token
//! - `ingredients` is a plain CRUD collection assigning `srv-N` ids

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{FromRequest, Multipart, Path as UrlPath, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use recipe_box_client::config::ApiConfig;
use recipe_box_client::gateway::REQUEST_ID_HEADER;
use recipe_box_client::{AppState, FileStore, HttpGateway};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// A running in-memory backend. The server stops when this is dropped.
pub struct TestBackend {
    base_url: Url,
    state: BackendState,
    server: JoinHandle<()>,
}

#[derive(Clone, Default)]
struct BackendState {
    data: Arc<Mutex<Data>>,
}

#[derive(Default)]
struct Data {
    next_id: u64,
    /// email -> (password, user id)
    users: HashMap<String, (String, String)>,
    /// access token -> user id
    tokens: HashMap<String, String>,
    recipes: Vec<Value>,
    /// user id -> favorite recipe ids
    favorites: HashMap<String, Vec<String>>,
    ingredients: Vec<Value>,
    orders: Vec<Value>,
    uploads: Vec<String>,
    request_ids: Vec<String>,
    slow_search: Option<(String, Duration)>,
}

impl Data {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

impl BackendState {
    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// User id for the request's bearer token.
    fn user(&self, headers: &HeaderMap) -> Result<String, Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        token
            .and_then(|token| self.lock().tokens.get(token).cloned())
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Missing or expired token"))
    }
}

impl TestBackend {
    /// Start a backend with no users and no data.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let state = BackendState::default();
        let app = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test backend");
        let addr = listener.local_addr().expect("Failed to read local address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let base_url = Url::parse(&format!("http://{addr}/api/")).expect("Invalid base URL");
        Self {
            base_url,
            state,
            server,
        }
    }

    /// Base URL to configure the gateway with.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Gateway configuration pointing at this backend.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(5),
            api_key: None,
        }
    }

    /// Build an [`AppState`] on a real [`HttpGateway`] and a [`FileStore`]
    /// inside `dir`.
    ///
    /// # Panics
    ///
    /// Panics if the gateway cannot be built or persisted state is unreadable.
    pub async fn app_state(&self, dir: &Path) -> AppState {
        let gateway = HttpGateway::new(&self.api_config()).expect("Failed to build gateway");
        let storage = FileStore::new(dir.join("state.json"));
        AppState::new(Arc::new(gateway), Arc::new(storage))
            .await
            .expect("Failed to build app state")
    }

    /// Register an account directly.
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let mut data = self.state.lock();
        let user_id = data.next_id("u");
        data.users
            .insert(email.to_string(), (password.to_string(), user_id.clone()));
        user_id
    }

    /// Insert a recipe; `id` is assigned when absent. Returns the id.
    pub fn seed_recipe(&self, recipe: Value) -> String {
        let mut data = self.state.lock();
        let mut recipe = into_object(recipe);
        let id = match recipe.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => data.next_id("r"),
        };
        recipe.insert("id".to_string(), json!(id));
        data.recipes.push(Value::Object(recipe));
        id
    }

    /// Delay `GET recipes?search=<query>` by `delay`.
    pub fn slow_search(&self, query: &str, delay: Duration) {
        self.state.lock().slow_search = Some((query.to_string(), delay));
    }

    /// Revoke every issued access token.
    pub fn expire_sessions(&self) {
        self.state.lock().tokens.clear();
    }

    /// File names of images received with multipart creates.
    #[must_use]
    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().uploads.clone()
    }

    /// Every `x-request-id` received, in arrival order.
    #[must_use]
    pub fn request_ids(&self) -> Vec<String> {
        self.state.lock().request_ids.clone()
    }

    /// Orders placed so far.
    #[must_use]
    pub fn orders(&self) -> Vec<Value> {
        self.state.lock().orders.clone()
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(state: BackendState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/mine", get(my_recipes))
        .route(
            "/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/favorites", get(list_favorites))
        .route(
            "/favorites/{id}",
            post(add_favorite).delete(remove_favorite),
        )
        .route("/ingredients", get(list_ingredients).post(create_ingredient))
        .route(
            "/ingredients/{id}",
            get(get_ingredient)
                .put(update_ingredient)
                .delete(delete_ingredient),
        )
        .route("/orders", get(list_orders).post(create_order));

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), record_request_id))
        .with_state(state)
}

async fn record_request_id(State(state): State<BackendState>, request: Request, next: Next) -> Response {
    if let Some(id) = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        state.lock().request_ids.push(id.to_string());
    }
    next.run(request).await
}

// =============================================================================
// Helpers
// =============================================================================

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn enveloped(value: Value) -> Response {
    Json(json!({ "result": value })).into_response()
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn merge(target: &mut Value, patch: Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            if key != "id" {
                target.insert(key, value);
            }
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<BackendState>, Json(body): Json<LoginBody>) -> Response {
    let mut data = state.lock();
    let Some(user_id) = data
        .users
        .get(&body.email)
        .filter(|(password, _)| *password == body.password)
        .map(|(_, user_id)| user_id.clone())
    else {
        return failure(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };

    let access_token = data.next_id("access");
    data.tokens.insert(access_token.clone(), user_id.clone());
    enveloped(json!({
        "userId": user_id,
        "accessToken": access_token,
        "refreshToken": format!("refresh-{user_id}"),
        "user": { "id": user_id, "email": body.email }
    }))
}

async fn register(State(state): State<BackendState>, Json(body): Json<Value>) -> Response {
    let email = field(&body, "email").to_string();
    let password = field(&body, "password").to_string();
    let mut data = state.lock();
    if data.users.contains_key(&email) {
        return failure(StatusCode::CONFLICT, "Email already registered");
    }
    let user_id = data.next_id("u");
    data.users.insert(email.clone(), (password, user_id.clone()));
    (
        StatusCode::CREATED,
        Json(json!({ "id": user_id, "email": email })),
    )
        .into_response()
}

// =============================================================================
// Recipes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipeQuery {
    search: Option<String>,
    category_id: Option<String>,
}

async fn list_recipes(State(state): State<BackendState>, Query(query): Query<RecipeQuery>) -> Response {
    let delay = state
        .lock()
        .slow_search
        .clone()
        .filter(|(slow, _)| query.search.as_deref() == Some(slow.as_str()))
        .map(|(_, delay)| delay);
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let search = query.search.unwrap_or_default().to_lowercase();
    let recipes: Vec<Value> = state
        .lock()
        .recipes
        .iter()
        .filter(|recipe| field(recipe, "title").to_lowercase().contains(&search))
        .filter(|recipe| {
            query
                .category_id
                .as_deref()
                .is_none_or(|category| field(recipe, "categoryId") == category)
        })
        .cloned()
        .collect();
    Json(recipes).into_response()
}

async fn get_recipe(State(state): State<BackendState>, UrlPath(id): UrlPath<String>) -> Response {
    let data = state.lock();
    data.recipes
        .iter()
        .find(|recipe| field(recipe, "id") == id)
        .map_or_else(
            || failure(StatusCode::NOT_FOUND, "Recipe not found"),
            |recipe| enveloped(recipe.clone()),
        )
}

async fn my_recipes(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let recipes: Vec<Value> = state
        .lock()
        .recipes
        .iter()
        .filter(|recipe| field(recipe, "authorId") == user_id)
        .cloned()
        .collect();
    enveloped(Value::Array(recipes))
}

async fn create_recipe(State(state): State<BackendState>, request: Request) -> Response {
    let user_id = match state.user(request.headers()) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let (body, image) = if is_multipart {
        match read_multipart(request).await {
            Ok(parts) => parts,
            Err(response) => return response,
        }
    } else {
        match Json::<Value>::from_request(request, &()).await {
            Ok(Json(body)) => (body, None),
            Err(rejection) => return rejection.into_response(),
        }
    };

    let mut data = state.lock();
    let id = data.next_id("srv");
    let mut recipe = into_object(body);
    recipe.insert("id".to_string(), json!(id));
    recipe.insert("authorId".to_string(), json!(user_id));
    if let Some(file_name) = image {
        recipe.insert("imageUrl".to_string(), json!(format!("/images/{file_name}")));
        data.uploads.push(file_name);
    }
    let recipe = Value::Object(recipe);
    data.recipes.push(recipe.clone());
    (StatusCode::CREATED, Json(json!({ "result": recipe }))).into_response()
}

async fn read_multipart(request: Request) -> Result<(Value, Option<String>), Response> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    let mut body = Value::Null;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        match field.name() {
            Some("data") => {
                let text = field.text().await.map_err(IntoResponse::into_response)?;
                body = serde_json::from_str(&text)
                    .map_err(|_| failure(StatusCode::BAD_REQUEST, "data part is not JSON"))?;
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
                if bytes.is_empty() {
                    return Err(failure(StatusCode::BAD_REQUEST, "empty image"));
                }
                image = Some(file_name);
            }
            _ => {}
        }
    }
    Ok((body, image))
}

async fn update_recipe(
    State(state): State<BackendState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let mut data = state.lock();
    let Some(recipe) = data.recipes.iter_mut().find(|recipe| field(recipe, "id") == id) else {
        return failure(StatusCode::NOT_FOUND, "Recipe not found");
    };
    if field(recipe, "authorId") != user_id {
        return failure(StatusCode::FORBIDDEN, "Not your recipe");
    }
    merge(recipe, patch);
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_recipe(
    State(state): State<BackendState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let mut data = state.lock();
    let before = data.recipes.len();
    data.recipes
        .retain(|recipe| field(recipe, "id") != id || field(recipe, "authorId") != user_id);
    if data.recipes.len() == before {
        return failure(StatusCode::NOT_FOUND, "Recipe not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Favorites
// =============================================================================

async fn list_favorites(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let data = state.lock();
    let ids = data.favorites.get(&user_id).cloned().unwrap_or_default();
    let recipes: Vec<Value> = ids
        .iter()
        .filter_map(|id| data.recipes.iter().find(|recipe| field(recipe, "id") == id.as_str()))
        .cloned()
        .collect();
    Json(recipes).into_response()
}

async fn add_favorite(
    State(state): State<BackendState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let mut data = state.lock();
    if !data.recipes.iter().any(|recipe| field(recipe, "id") == id) {
        return failure(StatusCode::NOT_FOUND, "Recipe not found");
    }
    let favorites = data.favorites.entry(user_id).or_default();
    if !favorites.contains(&id) {
        favorites.push(id);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn remove_favorite(
    State(state): State<BackendState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if let Some(favorites) = state.lock().favorites.get_mut(&user_id) {
        favorites.retain(|favorite| *favorite != id);
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Ingredients
// =============================================================================

async fn list_ingredients(State(state): State<BackendState>) -> Response {
    enveloped(Value::Array(state.lock().ingredients.clone()))
}

async fn get_ingredient(State(state): State<BackendState>, UrlPath(id): UrlPath<String>) -> Response {
    let data = state.lock();
    data.ingredients
        .iter()
        .find(|ingredient| field(ingredient, "id") == id)
        .map_or_else(
            || failure(StatusCode::NOT_FOUND, "Ingredient not found"),
            |ingredient| Json(ingredient.clone()).into_response(),
        )
}

async fn create_ingredient(State(state): State<BackendState>, Json(body): Json<Value>) -> Response {
    if field(&body, "name").is_empty() {
        return failure(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    }
    let mut data = state.lock();
    let mut ingredient = into_object(body);
    ingredient.insert("id".to_string(), json!(data.next_id("srv")));
    let ingredient = Value::Object(ingredient);
    data.ingredients.push(ingredient.clone());
    (StatusCode::CREATED, Json(ingredient)).into_response()
}

async fn update_ingredient(
    State(state): State<BackendState>,
    UrlPath(id): UrlPath<String>,
    Json(patch): Json<Value>,
) -> Response {
    let mut data = state.lock();
    match data
        .ingredients
        .iter_mut()
        .find(|ingredient| field(ingredient, "id") == id)
    {
        Some(ingredient) => {
            merge(ingredient, patch);
            StatusCode::NO_CONTENT.into_response()
        }
        None => failure(StatusCode::NOT_FOUND, "Ingredient not found"),
    }
}

async fn delete_ingredient(State(state): State<BackendState>, UrlPath(id): UrlPath<String>) -> Response {
    let mut data = state.lock();
    let before = data.ingredients.len();
    data.ingredients.retain(|ingredient| field(ingredient, "id") != id);
    if data.ingredients.len() == before {
        return failure(StatusCode::NOT_FOUND, "Ingredient not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let orders: Vec<Value> = state
        .lock()
        .orders
        .iter()
        .filter(|order| field(order, "userId") == user_id)
        .cloned()
        .collect();
    enveloped(Value::Array(orders))
}

async fn create_order(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user_id = match state.user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let lines = body.get("lines").cloned().unwrap_or_else(|| json!([]));
    let total: f64 = lines
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| {
                    let price = line.get("price")?.as_f64()?;
                    let quantity = line.get("quantity")?.as_f64()?;
                    Some(price * quantity)
                })
                .sum()
        })
        .unwrap_or_default();

    let mut data = state.lock();
    let order = json!({
        "id": data.next_id("o"),
        "userId": user_id,
        "lines": lines,
        "total": total,
        "status": "pending",
    });
    data.orders.push(order.clone());
    (StatusCode::CREATED, Json(json!({ "result": order }))).into_response()
}
