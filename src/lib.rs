//! Client library for the TaskCard notes API
//!
//! [`api::ApiClient`] talks to the server, [`cache::CacheStore`] keeps
//! durable snapshots for offline reads, and [`store::TaskStore`] ties the
//! two together behind a reducer-driven state container. [`config`] and
//! [`session`] cover the on-disk settings and the saved login.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod session;
pub mod store;

pub use api::{ApiClient, ApiError, ApiResult};
pub use cache::{CacheStore, TasksSnapshot};
pub use config::Config;
pub use session::Session;
pub use store::{StoreState, TaskStore};
