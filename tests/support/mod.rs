//! In-process TaskCard API double for integration tests
//!
//! A miniature axum server speaking the same wire format as a real TaskCard
//! deployment, with request counters so tests can tell a cache hit from a
//! network round-trip and a failure switch to simulate outages.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path as UrlPath, Query, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;

use taskcard::api::ApiClient;
use taskcard::cache::CacheStore;
use taskcard::config::Config;
use taskcard::models::{Profile, Task, TaskColor, User};
use taskcard::store::TaskStore;

pub const TOKEN: &str = "test-token";
pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "hunter2";

fn palette() -> Vec<TaskColor> {
    let colors = [
        (1, "White", "#FFFFFF"),
        (2, "Blue", "#BAE2FF"),
        (3, "Green", "#DAFF8B"),
        (4, "Yellow", "#FFE8AC"),
        (5, "Pink", "#FFA8EA"),
    ];
    colors
        .into_iter()
        .map(|(id, name, hex_code)| TaskColor {
            id,
            name: name.to_string(),
            hex_code: hex_code.to_string(),
        })
        .collect()
}

fn sample_user() -> User {
    User {
        id: 1,
        name: "Ada".to_string(),
        email: EMAIL.to_string(),
        profile: Profile::Member,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Shared state behind the API double
pub struct MockState {
    tasks: Mutex<Vec<Task>>,
    colors: Vec<TaskColor>,
    api_token: Option<String>,
    next_id: AtomicI64,
    list_calls: AtomicUsize,
    favorites_calls: AtomicUsize,
    colors_calls: AtomicUsize,
    fail: AtomicBool,
    list_delay_ms: AtomicU64,
}

impl MockState {
    fn new(api_token: Option<String>) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            colors: palette(),
            api_token,
            next_id: AtomicI64::new(1),
            list_calls: AtomicUsize::new(0),
            favorites_calls: AtomicUsize::new(0),
            colors_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            list_delay_ms: AtomicU64::new(0),
        }
    }

    fn color(&self, id: i64) -> Option<TaskColor> {
        self.colors.iter().find(|color| color.id == id).cloned()
    }

    fn failing(&self) -> bool {
        self.fail.load(Ordering::SeqCst)
    }

    /// Make every data endpoint answer 500 until turned off again
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Hold task listing responses for `ms` milliseconds
    pub fn set_list_delay_ms(&self, ms: u64) {
        self.list_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn favorites_calls(&self) -> usize {
        self.favorites_calls.load(Ordering::SeqCst)
    }

    pub fn colors_calls(&self) -> usize {
        self.colors_calls.load(Ordering::SeqCst)
    }

    /// Insert a task server-side; newest tasks list first
    pub fn insert_task(&self, title: &str, content: &str, color_id: i64) -> Task {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let color = self
            .color(color_id)
            .unwrap_or_else(|| self.colors[0].clone());
        let task = Task {
            id,
            title: title.to_string(),
            content: content.to_string(),
            color_id: color.id,
            color,
            is_favorited: false,
            user_id: 1,
            created_at: "2024-05-01T10:00:00Z".to_string(),
            updated_at: "2024-05-01T10:00:00Z".to_string(),
        };
        self.tasks.lock().unwrap().insert(0, task.clone());
        task
    }

    pub fn seed(&self, titles: &[&str]) {
        for title in titles {
            self.insert_task(title, "seeded", 1);
        }
    }

    pub fn mark_favorite(&self, id: i64) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|task| task.id == id) {
            task.is_favorited = true;
        }
    }
}

pub struct MockApi {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockApi {
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Variant requiring an `X-API-TOKEN` header on every request
    pub async fn start_with_api_token(token: &str) -> Self {
        Self::start_inner(Some(token.to_string())).await
    }

    async fn start_inner(api_token: Option<String>) -> Self {
        let state = Arc::new(MockState::new(api_token));
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Config pointing at this double, with the cache in `cache_path`
    pub fn config(&self, cache_path: &Path) -> Config {
        let mut config = Config::default();
        config.server.base_url = self.base_url();
        config.cache.path = cache_path.to_path_buf();
        config
    }
}

/// Config pointing at a closed port, for offline scenarios
pub fn unreachable_config(cache_path: &Path) -> Config {
    let mut config = Config::default();
    config.server.base_url = "http://127.0.0.1:1".to_string();
    config.server.timeout_secs = 2;
    config.cache.path = cache_path.to_path_buf();
    config
}

pub fn authed_client(config: &Config) -> ApiClient {
    let mut api = ApiClient::new(&config.server).unwrap();
    api.set_token(Some(TOKEN.to_string()));
    api
}

pub fn open_store(config: &Config) -> TaskStore {
    let cache = CacheStore::open(&config.cache.path).unwrap();
    TaskStore::new(authed_client(config), cache, config)
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/user", get(current_user))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/favorites", get(list_favorites))
        .route("/tasks/colors", get(list_colors))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/favorite", post(toggle_favorite))
        .route("/tasks/{id}/color/{color_id}", put(change_color))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<Arc<MockState>>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(required) = &state.api_token {
        let sent = request
            .headers()
            .get("X-API-TOKEN")
            .and_then(|h| h.to_str().ok());
        if sent != Some(required.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "message": "Missing API token." })),
            )
                .into_response();
        }
    }

    let path = request.uri().path();
    if path == "/login" || path == "/register" {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let authorized = matches!(
        auth_header,
        Some(h) if h.strip_prefix("Bearer ") == Some(TOKEN)
    );
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": "Unauthenticated." })),
        )
            .into_response();
    }

    next.run(request).await
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": "Server had a problem." })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "No query results for this id." })),
    )
        .into_response()
}

fn validation_error(errors: serde_json::Map<String, serde_json::Value>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({
            "message": "The given data was invalid.",
            "errors": errors,
        })),
    )
        .into_response()
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(serde_json::json!({ "token": TOKEN, "user": sample_user() })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": "Invalid credentials." })),
        )
            .into_response()
    }
}

async fn register(Json(body): Json<serde_json::Value>) -> Response {
    let name = body["name"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let confirmation = body["password_confirmation"].as_str().unwrap_or_default();

    let mut errors = serde_json::Map::new();
    if name.is_empty() {
        errors.insert(
            "name".to_string(),
            serde_json::json!(["The name field is required."]),
        );
    }
    if password != confirmation {
        errors.insert(
            "password".to_string(),
            serde_json::json!(["The password confirmation does not match."]),
        );
    }
    if !errors.is_empty() {
        return validation_error(errors);
    }

    let mut user = sample_user();
    user.name = name.to_string();
    if let Some(email) = body["email"].as_str() {
        user.email = email.to_string();
    }
    Json(serde_json::json!({ "token": TOKEN, "user": user })).into_response()
}

async fn logout() -> Response {
    Json(serde_json::json!({ "message": "Logged out." })).into_response()
}

async fn current_user() -> Response {
    Json(serde_json::json!({ "data": sample_user() })).into_response()
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
    search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

async fn list_tasks(
    State(state): State<Arc<MockState>>,
    Query(params): Query<ListParams>,
) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if state.failing() {
        return server_error();
    }

    let filtered: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|task| match &params.search {
            Some(needle) if !needle.is_empty() => task
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        })
        .cloned()
        .collect();

    let total = filtered.len() as u64;
    let per_page = params.per_page.max(1);
    let last_page = (filtered.len() as u32).div_ceil(per_page).max(1);
    let page = params.page.max(1);
    let start = ((page - 1) * per_page) as usize;
    let data: Vec<Task> = filtered
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();

    Json(serde_json::json!({
        "data": data,
        "meta": {
            "current_page": page,
            "last_page": last_page,
            "per_page": per_page,
            "total": total,
        }
    }))
    .into_response()
}

async fn list_favorites(
    State(state): State<Arc<MockState>>,
    Query(params): Query<ListParams>,
) -> Response {
    state.favorites_calls.fetch_add(1, Ordering::SeqCst);
    if state.failing() {
        return server_error();
    }

    let favorites: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|task| task.is_favorited)
        .cloned()
        .collect();
    let total = favorites.len() as u64;

    Json(serde_json::json!({
        "data": favorites,
        "meta": {
            "current_page": 1,
            "last_page": 1,
            "per_page": params.per_page,
            "total": total,
        }
    }))
    .into_response()
}

async fn list_colors(State(state): State<Arc<MockState>>) -> Response {
    state.colors_calls.fetch_add(1, Ordering::SeqCst);
    if state.failing() {
        return server_error();
    }
    Json(serde_json::json!({ "data": &state.colors })).into_response()
}

async fn get_task(State(state): State<Arc<MockState>>, UrlPath(id): UrlPath<i64>) -> Response {
    let tasks = state.tasks.lock().unwrap();
    match tasks.iter().find(|task| task.id == id) {
        Some(task) => Json(serde_json::json!({ "data": task })).into_response(),
        None => not_found(),
    }
}

async fn create_task(
    State(state): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if state.failing() {
        return server_error();
    }

    let title = body["title"].as_str().unwrap_or_default();
    let content = body["content"].as_str().unwrap_or_default();

    let mut errors = serde_json::Map::new();
    if title.is_empty() {
        errors.insert(
            "title".to_string(),
            serde_json::json!(["The title field is required."]),
        );
    }
    if content.is_empty() {
        errors.insert(
            "content".to_string(),
            serde_json::json!(["The content field is required."]),
        );
    }
    if !errors.is_empty() {
        return validation_error(errors);
    }

    let color_id = body["color_id"].as_i64().unwrap_or(1);
    let task = state.insert_task(title, content, color_id);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": task })),
    )
        .into_response()
}

async fn update_task(
    State(state): State<Arc<MockState>>,
    UrlPath(id): UrlPath<i64>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if state.failing() {
        return server_error();
    }

    let mut tasks = state.tasks.lock().unwrap();
    let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
        return not_found();
    };

    if let Some(title) = body["title"].as_str() {
        task.title = title.to_string();
    }
    if let Some(content) = body["content"].as_str() {
        task.content = content.to_string();
    }
    if let Some(color_id) = body["color_id"].as_i64()
        && let Some(color) = state.color(color_id)
    {
        task.color_id = color.id;
        task.color = color;
    }
    task.updated_at = "2024-05-02T09:00:00Z".to_string();

    Json(serde_json::json!({ "data": task.clone() })).into_response()
}

async fn delete_task(State(state): State<Arc<MockState>>, UrlPath(id): UrlPath<i64>) -> Response {
    if state.failing() {
        return server_error();
    }

    let mut tasks = state.tasks.lock().unwrap();
    let before = tasks.len();
    tasks.retain(|task| task.id != id);
    if tasks.len() == before {
        return not_found();
    }
    Json(serde_json::json!({ "message": "Task deleted." })).into_response()
}

async fn toggle_favorite(
    State(state): State<Arc<MockState>>,
    UrlPath(id): UrlPath<i64>,
) -> Response {
    if state.failing() {
        return server_error();
    }

    let mut tasks = state.tasks.lock().unwrap();
    let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
        return not_found();
    };
    task.is_favorited = !task.is_favorited;
    Json(serde_json::json!({ "data": { "is_favorited": task.is_favorited } })).into_response()
}

async fn change_color(
    State(state): State<Arc<MockState>>,
    UrlPath((id, color_id)): UrlPath<(i64, i64)>,
) -> Response {
    if state.failing() {
        return server_error();
    }

    let Some(color) = state.color(color_id) else {
        let mut errors = serde_json::Map::new();
        errors.insert(
            "color_id".to_string(),
            serde_json::json!(["The selected color is invalid."]),
        );
        return validation_error(errors);
    };

    let mut tasks = state.tasks.lock().unwrap();
    let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
        return not_found();
    };
    task.color_id = color.id;
    task.color = color;
    Json(serde_json::json!({ "data": task.clone() })).into_response()
}
