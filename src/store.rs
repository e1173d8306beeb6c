//! Task list state container
//!
//! Owns the client-side view of the task list: the loaded page, the
//! favorites subset, the color palette, and the loading/error flags,
//! together with the freshness window that lets repeat fetches be answered
//! without touching the network. All state mutation goes through
//! [`StoreState::apply`], a synchronous reducer over [`Action`] values; the
//! async methods on [`TaskStore`] only perform I/O and dispatch.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::api::{ApiClient, ApiResult};
use crate::cache::{CacheStore, TasksSnapshot};
use crate::config::Config;
use crate::models::{CreateTaskRequest, ErrorDetail, Task, TaskColor, UpdateTaskRequest};

/// Observable container state
///
/// Consumers receive clones of this; nothing outside the container mutates
/// it. `last_fetched = None` is the stale sentinel: only a successful
/// network load opens a freshness window.
#[derive(Debug, Clone)]
pub struct StoreState {
    /// Currently loaded page, in server order
    pub tasks: Vec<Task>,
    /// Favorites subset, loaded on demand
    pub favorites: Vec<Task>,
    pub colors: Vec<TaskColor>,
    /// True while a task fetch is outstanding
    pub loading: bool,
    /// Last failure; cleared when a new operation starts
    pub error: Option<ErrorDetail>,
    pub total_pages: u32,
    /// 1-based
    pub current_page: u32,
    pub last_fetched: Option<DateTime<Utc>>,
    pub search_query: String,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            favorites: Vec::new(),
            colors: Vec::new(),
            loading: false,
            error: None,
            total_pages: 1,
            current_page: 1,
            last_fetched: None,
            search_query: String::new(),
        }
    }
}

/// State transitions, applied atomically under the container lock
#[derive(Debug)]
enum Action {
    FetchStarted,
    PageLoaded {
        tasks: Vec<Task>,
        total_pages: u32,
        page: u32,
        search: String,
        fetched_at: DateTime<Utc>,
    },
    /// Offline fallback from the durable cache after a failed fetch
    PageRestored { snapshot: TasksSnapshot },
    FetchFailed { error: ErrorDetail },
    FavoritesLoaded { tasks: Vec<Task> },
    ColorsLoaded { colors: Vec<TaskColor> },
    Created { task: Task },
    Replaced { task: Task },
    Removed { id: i64 },
    FavoriteToggled { id: i64, favorited: bool },
    OperationFailed { error: ErrorDetail },
    SearchChanged { query: String },
    ErrorCleared,
    Invalidated,
}

fn replace_by_id(tasks: &mut [Task], replacement: &Task) {
    for task in tasks.iter_mut() {
        if task.id == replacement.id {
            *task = replacement.clone();
        }
    }
}

impl StoreState {
    fn apply(&mut self, action: Action) {
        match action {
            Action::FetchStarted => {
                self.loading = true;
                self.error = None;
            }
            Action::PageLoaded {
                tasks,
                total_pages,
                page,
                search,
                fetched_at,
            } => {
                self.tasks = tasks;
                self.total_pages = total_pages.max(1);
                self.current_page = page;
                self.search_query = search;
                self.last_fetched = Some(fetched_at);
                self.loading = false;
            }
            Action::PageRestored { snapshot } => {
                // The error stays visible and the window stays closed, so
                // the next fetch goes back to the network.
                self.tasks = snapshot.tasks;
                self.total_pages = snapshot.total_pages.max(1);
                self.current_page = snapshot.current_page;
                self.search_query = snapshot.search_query;
                self.loading = false;
            }
            Action::FetchFailed { error } => {
                self.error = Some(error);
                self.loading = false;
                self.last_fetched = None;
            }
            Action::FavoritesLoaded { tasks } => {
                self.favorites = tasks;
            }
            Action::ColorsLoaded { colors } => {
                self.colors = colors;
            }
            Action::Created { task } => {
                self.tasks.insert(0, task);
                self.last_fetched = None;
            }
            Action::Replaced { task } => {
                replace_by_id(&mut self.tasks, &task);
                replace_by_id(&mut self.favorites, &task);
                self.last_fetched = None;
            }
            Action::Removed { id } => {
                self.tasks.retain(|task| task.id != id);
                self.favorites.retain(|task| task.id != id);
                self.last_fetched = None;
            }
            Action::FavoriteToggled { id, favorited } => {
                if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
                    task.is_favorited = favorited;
                }
                if favorited {
                    if !self.favorites.iter().any(|task| task.id == id)
                        && let Some(task) = self.tasks.iter().find(|task| task.id == id)
                    {
                        self.favorites.push(task.clone());
                    }
                } else {
                    self.favorites.retain(|task| task.id != id);
                }
                self.last_fetched = None;
            }
            Action::OperationFailed { error } => {
                self.error = Some(error);
            }
            Action::SearchChanged { query } => {
                // A pending query that differs from the loaded page makes
                // the page stale; only a matching fetch can reopen the
                // window.
                if query != self.search_query {
                    self.last_fetched = None;
                }
                self.search_query = query;
            }
            Action::ErrorCleared => {
                self.error = None;
            }
            Action::Invalidated => {
                self.last_fetched = None;
            }
        }
    }

    /// Client-side filter of the loaded page by color
    pub fn tasks_with_color(&self, color_id: i64) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.color_id == color_id)
            .collect()
    }
}

/// Task list state container
///
/// Methods take `&self`; state access is serialized through an internal
/// lock that is never held across an await. Read operations (`fetch_tasks`,
/// `fetch_favorites`, `load_colors`) swallow failures into the `error`
/// field and fall back to the durable cache; mutating operations record the
/// failure and also return it to the caller.
pub struct TaskStore {
    api: ApiClient,
    cache: CacheStore,
    state: Mutex<StoreState>,
    fetch_seq: AtomicU64,
    max_age: Duration,
    per_page: u32,
}

impl TaskStore {
    pub fn new(api: ApiClient, cache: CacheStore, config: &Config) -> Self {
        Self {
            api,
            cache,
            state: Mutex::new(StoreState::default()),
            fetch_seq: AtomicU64::new(0),
            max_age: Duration::seconds(config.cache.max_age_secs as i64),
            per_page: config.server.per_page,
        }
    }

    /// Clone of the current state for consumers
    pub fn state(&self) -> StoreState {
        self.state.lock().unwrap().clone()
    }

    fn dispatch(&self, action: Action) {
        self.state.lock().unwrap().apply(action);
    }

    /// Apply `action` only if `seq` is still the newest task fetch
    ///
    /// The sequence check happens under the state lock, so a superseded
    /// fetch can never slip its result in between the check and the apply.
    fn dispatch_fenced(&self, seq: u64, action: Action) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.fetch_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!(seq, "Discarding action from a superseded fetch");
            return false;
        }
        state.apply(action);
        true
    }

    fn window_open(&self, fetched: Option<DateTime<Utc>>) -> bool {
        fetched.is_some_and(|at| Utc::now().signed_duration_since(at) < self.max_age)
    }

    fn is_fresh(&self, state: &StoreState, page: u32, search: &str) -> bool {
        self.window_open(state.last_fetched)
            && state.current_page == page
            && state.search_query == search
    }

    /// Load a page of tasks, answering from state while it is still fresh
    ///
    /// Failures do not propagate: the error lands in state and the last
    /// durable snapshot, if any, is restored in place of the page.
    pub async fn fetch_tasks(&self, page: u32, search: &str, force_refresh: bool) {
        {
            let state = self.state.lock().unwrap();
            if !force_refresh && self.is_fresh(&state, page, search) {
                tracing::debug!(page, "Tasks are still fresh, skipping fetch");
                return;
            }
        }

        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.dispatch_fenced(seq, Action::FetchStarted) {
            return;
        }

        let query = if search.is_empty() { None } else { Some(search) };
        match self.api.list_tasks(page, self.per_page, query).await {
            Ok(listing) => {
                let snapshot = TasksSnapshot {
                    tasks: listing.data,
                    total_pages: listing.meta.last_page.max(1),
                    current_page: listing.meta.current_page,
                    search_query: search.to_string(),
                };
                let applied = self.dispatch_fenced(
                    seq,
                    Action::PageLoaded {
                        tasks: snapshot.tasks.clone(),
                        total_pages: snapshot.total_pages,
                        page: snapshot.current_page,
                        search: snapshot.search_query.clone(),
                        fetched_at: Utc::now(),
                    },
                );
                if applied && let Err(err) = self.cache.store_tasks(&snapshot) {
                    tracing::warn!(error = %err, "Failed to mirror tasks to the cache");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, page, "Task fetch failed");
                if !self.dispatch_fenced(seq, Action::FetchFailed { error: err.detail() }) {
                    return;
                }
                match self.cache.load_tasks() {
                    Ok(Some(snapshot)) => {
                        tracing::info!(
                            tasks = snapshot.tasks.len(),
                            "Restoring tasks from the cache"
                        );
                        self.dispatch_fenced(seq, Action::PageRestored { snapshot });
                    }
                    Ok(None) => {}
                    Err(cache_err) => {
                        tracing::warn!(error = %cache_err, "Cache read failed during fallback");
                    }
                }
            }
        }
    }

    /// Load the favorites list, skipped while the window is open
    pub async fn fetch_favorites(&self, force_refresh: bool) {
        {
            let state = self.state.lock().unwrap();
            if !force_refresh
                && !state.favorites.is_empty()
                && self.window_open(state.last_fetched)
            {
                tracing::debug!("Favorites are still fresh, skipping fetch");
                return;
            }
        }

        self.dispatch(Action::ErrorCleared);
        match self.api.list_favorites(1, self.per_page).await {
            Ok(listing) => {
                if let Err(err) = self.cache.store_favorites(&listing.data) {
                    tracing::warn!(error = %err, "Failed to mirror favorites to the cache");
                }
                self.dispatch(Action::FavoritesLoaded {
                    tasks: listing.data,
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Favorites fetch failed");
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                match self.cache.load_favorites() {
                    Ok(Some(favorites)) => {
                        tracing::info!(
                            favorites = favorites.len(),
                            "Restoring favorites from the cache"
                        );
                        self.dispatch(Action::FavoritesLoaded { tasks: favorites });
                    }
                    Ok(None) => {}
                    Err(cache_err) => {
                        tracing::warn!(error = %cache_err, "Cache read failed during fallback");
                    }
                }
            }
        }
    }

    /// Fetch the color palette, once per session
    ///
    /// Colors are reference data: a failure falls back to the cached copy
    /// and never surfaces as an error.
    pub async fn load_colors(&self) {
        {
            let state = self.state.lock().unwrap();
            if !state.colors.is_empty() {
                return;
            }
        }

        match self.api.list_colors().await {
            Ok(colors) => {
                if let Err(err) = self.cache.store_colors(&colors) {
                    tracing::warn!(error = %err, "Failed to mirror colors to the cache");
                }
                self.dispatch(Action::ColorsLoaded { colors });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Color fetch failed, trying the cache");
                match self.cache.load_colors() {
                    Ok(Some(colors)) if !colors.is_empty() => {
                        self.dispatch(Action::ColorsLoaded { colors });
                    }
                    Ok(_) => {}
                    Err(cache_err) => {
                        tracing::warn!(error = %cache_err, "Cache read failed during fallback");
                    }
                }
            }
        }
    }

    /// Create a task; it appears at the top of the loaded page
    pub async fn create_task(&self, request: &CreateTaskRequest) -> ApiResult<Task> {
        self.dispatch(Action::ErrorCleared);
        match self.api.create_task(request).await {
            Ok(task) => {
                self.dispatch(Action::Created { task: task.clone() });
                Ok(task)
            }
            Err(err) => {
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                Err(err)
            }
        }
    }

    /// Partial update; the full server record replaces the stored one
    pub async fn update_task(&self, id: i64, request: &UpdateTaskRequest) -> ApiResult<Task> {
        self.dispatch(Action::ErrorCleared);
        match self.api.update_task(id, request).await {
            Ok(task) => {
                self.dispatch(Action::Replaced { task: task.clone() });
                Ok(task)
            }
            Err(err) => {
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                Err(err)
            }
        }
    }

    pub async fn delete_task(&self, id: i64) -> ApiResult<()> {
        self.dispatch(Action::ErrorCleared);
        match self.api.delete_task(id).await {
            Ok(()) => {
                self.dispatch(Action::Removed { id });
                Ok(())
            }
            Err(err) => {
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                Err(err)
            }
        }
    }

    /// Flip a task's favorite flag, returning the new value
    pub async fn toggle_favorite(&self, id: i64) -> ApiResult<bool> {
        self.dispatch(Action::ErrorCleared);
        match self.api.toggle_favorite(id).await {
            Ok(favorited) => {
                self.dispatch(Action::FavoriteToggled { id, favorited });
                Ok(favorited)
            }
            Err(err) => {
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                Err(err)
            }
        }
    }

    /// Move a task to another color; the server returns the updated record
    pub async fn change_color(&self, id: i64, color_id: i64) -> ApiResult<Task> {
        self.dispatch(Action::ErrorCleared);
        match self.api.change_color(id, color_id).await {
            Ok(task) => {
                self.dispatch(Action::Replaced { task: task.clone() });
                Ok(task)
            }
            Err(err) => {
                self.dispatch(Action::OperationFailed {
                    error: err.detail(),
                });
                Err(err)
            }
        }
    }

    pub fn clear_error(&self) {
        self.dispatch(Action::ErrorCleared);
    }

    /// Remember a search without fetching
    ///
    /// Changing the query closes the freshness window, so the next fetch
    /// goes to the network instead of serving the page loaded under the
    /// old query.
    pub fn set_search_query(&self, query: &str) {
        self.dispatch(Action::SearchChanged {
            query: query.to_string(),
        });
    }

    /// Close the freshness window so the next fetch hits the network
    pub fn invalidate(&self) {
        self.dispatch(Action::Invalidated);
    }
}
