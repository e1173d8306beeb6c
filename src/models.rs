//! Wire types for the TaskCard API
//!
//! Field names match the server's JSON exactly. Timestamps stay RFC 3339
//! strings rather than parsed dates for maximum compatibility with whatever
//! the server sends.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Access profile assigned to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Admin,
    Manager,
    #[default]
    Member,
}

/// An authenticated user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A color tag used to visually group task cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskColor {
    pub id: i64,
    pub name: String,
    pub hex_code: String,
}

/// A task card
///
/// `color` is a denormalized copy of the color record referenced by
/// `color_id`; the server keeps the two in step, which is why mutations
/// always replace the whole record instead of patching fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub color_id: i64,
    pub color: TaskColor,
    #[serde(default)]
    pub is_favorited: bool,
    pub user_id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Body for `POST /tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub content: String,
    /// Server picks its default color when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<i64>,
}

/// Body for `PUT /tasks/{id}`; omitted fields keep their current values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<i64>,
}

/// Body for `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body for `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Payload returned by login and register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

/// Payload returned by `POST /tasks/{id}/favorite`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub is_favorited: bool,
}

/// Single-resource envelope: `{ "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Paginated list envelope: `{ "data": [...], "meta": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Error body the server attaches to non-2xx responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    /// Per-field validation messages, keyed by field name
    #[serde(default)]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// Uniform failure record kept in container state and shown to users
///
/// Every failure, whatever its transport-level shape, is normalized to a
/// human-readable message plus optional field errors and HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}
