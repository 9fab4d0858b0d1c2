// src/state.rs

use std::sync::Arc;

use crate::config::Config;
use crate::timed_tasks::ActionRegistry;
use axum::extract::FromRef;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    /// Actions that timed tasks may be created for.
    pub actions: Arc<ActionRegistry>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ActionRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.actions.clone()
    }
}
