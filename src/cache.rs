//! Durable snapshot cache
//!
//! Local SQLite mirror of the last successfully fetched collections, used as
//! a read fallback when the server is unreachable. Writes are last-writer-wins
//! and best-effort: callers guard every call and a failure here must never
//! fail the operation that triggered it.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::models::{Task, TaskColor};

const KEY_TASKS: &str = "tasks";
const KEY_FAVORITES: &str = "favorites";
const KEY_COLORS: &str = "colors";

/// Everything needed to restore the task page after a failed fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksSnapshot {
    pub tasks: Vec<Task>,
    pub total_pages: u32,
    pub current_page: u32,
    pub search_query: String,
}

/// Thread-safe snapshot store
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let conn = Connection::open(path).context("Failed to open cache database")?;

        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;

        Ok(cache)
    }

    /// In-memory store for tests and cache-less operation
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory cache")?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init()?;
        Ok(cache)
    }

    /// Initialize the cache schema
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- One JSON snapshot per collection, replaced wholesale on write
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn put(&self, key: &str, payload: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (key, payload, saved_at) VALUES (?1, ?2, ?3)",
            params![key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let payload = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    pub fn store_tasks(&self, snapshot: &TasksSnapshot) -> Result<()> {
        self.put(KEY_TASKS, &serde_json::to_string(snapshot)?)
    }

    pub fn load_tasks(&self) -> Result<Option<TasksSnapshot>> {
        match self.get(KEY_TASKS)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn store_favorites(&self, favorites: &[Task]) -> Result<()> {
        self.put(KEY_FAVORITES, &serde_json::to_string(favorites)?)
    }

    pub fn load_favorites(&self) -> Result<Option<Vec<Task>>> {
        match self.get(KEY_FAVORITES)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn store_colors(&self, colors: &[TaskColor]) -> Result<()> {
        self.put(KEY_COLORS, &serde_json::to_string(colors)?)
    }

    pub fn load_colors(&self) -> Result<Option<Vec<TaskColor>>> {
        match self.get(KEY_COLORS)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Drop every stored snapshot, e.g. on logout
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM snapshots", [])?;
        Ok(())
    }
}
