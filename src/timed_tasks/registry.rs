// src/timed_tasks/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::models::part::Part;
use crate::models::timed_task::{TaskOptions, TimedTask};
use crate::timed_tasks::{ChangeStatusAction, TaskError};

/// An action a timed task can perform.
#[async_trait]
pub trait TaskAction: Send + Sync {
    /// Title given to new tasks of this kind.
    fn title(&self) -> &str;

    /// Checks the options an author submits when scheduling a task.
    fn validate_options(&self, part: &Part, options: &TaskOptions) -> Result<(), String>;

    /// Applies the task. `conn` is inside the runner's transaction, which
    /// already marked the task completed; returning an error rolls both back.
    async fn execute(&self, conn: &mut SqliteConnection, task: &TimedTask) -> Result<(), TaskError>;
}

/// Maps action names to their implementation. Built once at startup.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn TaskAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in action.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ChangeStatusAction::NAME, ChangeStatusAction);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, action: impl TaskAction + 'static) {
        self.actions.insert(name.into(), Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
