use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool is reference-counted and config sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: costkeeper_db::DbPool,
    /// Server configuration, including assignment-engine tuning.
    pub config: Arc<ServerConfig>,
}
