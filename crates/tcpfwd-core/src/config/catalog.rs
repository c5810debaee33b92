//! Task catalog: the configured tasks, independent of what is running.

use std::sync::{PoisonError, RwLock};

use super::TaskConfig;

/// Source of the configured task list.
///
/// Implemented by whatever owns the configuration (a file loader, a UI
/// model). The registry only reads from it.
pub trait TaskCatalog: Send + Sync {
    /// Snapshot of every configured task, in configuration order.
    fn tasks(&self) -> Vec<TaskConfig>;
}

/// Thread-safe in-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tasks: RwLock<Vec<TaskConfig>>,
}

impl MemoryCatalog {
    /// Create a catalog holding `tasks`.
    pub fn new(tasks: Vec<TaskConfig>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// Insert a task, replacing any task with the same name.
    ///
    /// Returns true if an existing entry was replaced.
    pub fn upsert(&self, task: TaskConfig) -> bool {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        match tasks.iter_mut().find(|t| t.name == task.name) {
            Some(existing) => {
                *existing = task;
                true
            }
            None => {
                tasks.push(task);
                false
            }
        }
    }

    /// Remove a task by name.
    pub fn remove(&self, name: &str) -> Option<TaskConfig> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let index = tasks.iter().position(|t| t.name == name)?;
        Some(tasks.remove(index))
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<TaskConfig> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }
}

impl TaskCatalog for MemoryCatalog {
    fn tasks(&self) -> Vec<TaskConfig> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
