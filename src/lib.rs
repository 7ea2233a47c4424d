//! Elidune circulation engine
//!
//! Tracks the copies of each catalog item across lending buckets, records
//! loans and returns with overdue fines, and queues reservations that are
//! served as copies come back. Exposed as a library and as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
