//! Registry of running tasks.
//!
//! The registry owns every running [`ProxyTask`] keyed by name. All mutations
//! of the map happen under one mutex:
//! - `start_task` reserves the name before binding, so a concurrent start for
//!   the same name fails with `DuplicateTask` instead of racing the bind
//! - a task removes itself on completion only if the entry still holds the
//!   same start generation, so a late callback never evicts a newer task
//! - `stop_task` only triggers the stop signal; completion is observed through
//!   the returned [`TaskCompletion`]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use crate::config::{PortMapping, RelayConfig, TaskCatalog, TaskConfig};
use crate::error::{Error, Result};
use crate::proxy::{PendingTask, ProxyTask, TaskCompletion, TaskStatsSnapshot};

type TaskMap = HashMap<String, TaskSlot>;

/// Registry callback a task runs once all its forwarders have exited.
type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// State of one name in the registry.
enum TaskSlot {
    /// Listeners are being bound; the name is taken but not running yet.
    Starting,
    /// Task is running (or stopping but not yet complete).
    Running { id: u64, task: Arc<ProxyTask> },
}

/// Set of running tasks, keyed by name.
pub struct TaskRegistry {
    tasks: Arc<Mutex<TaskMap>>,
    catalog: Arc<dyn TaskCatalog>,
    config: RelayConfig,
    next_id: AtomicU64,
}

impl TaskRegistry {
    /// Create a registry with the default relay config.
    pub fn new(catalog: Arc<dyn TaskCatalog>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            catalog,
            config: RelayConfig::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a registry with a custom relay config.
    pub fn with_config(catalog: Arc<dyn TaskCatalog>, config: RelayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            catalog,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start a task forwarding each `ports` mapping to `host`.
    ///
    /// Fails with `DuplicateTask` if `name` is running or starting, with
    /// `InvalidConfig` if the mappings are rejected, and with `Bind` if any
    /// listen port cannot be bound. On failure no listener of this task stays
    /// bound and the registry is unchanged.
    pub async fn start_task(&self, name: &str, host: &str, ports: &[PortMapping]) -> Result<()> {
        self.start_config(&TaskConfig::new(name, host, ports.to_vec())).await
    }

    /// Start a task from its config.
    pub async fn start_config(&self, config: &TaskConfig) -> Result<()> {
        self.start_with(config, |pending, on_complete| pending.launch(on_complete))
            .await
    }

    async fn start_with<L>(&self, config: &TaskConfig, launch: L) -> Result<()>
    where
        L: FnOnce(PendingTask, OnComplete) -> Arc<ProxyTask>,
    {
        config.validate()?;

        let reservation = self.reserve(&config.name)?;
        let pending = ProxyTask::bind(config.clone(), &self.config).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let on_complete: OnComplete = {
            let tasks = Arc::downgrade(&self.tasks);
            let name = config.name.clone();
            Box::new(move || remove_if_current(&tasks, &name, id))
        };

        // Launch under the lock so the completion callback cannot run before
        // the entry is inserted.
        let mut tasks = self.lock();
        let task = launch(pending, on_complete);
        tasks.insert(config.name.clone(), TaskSlot::Running { id, task });
        reservation.commit();

        debug!(task = %config.name, id, "Task registered");
        Ok(())
    }

    /// Stop a task without waiting for it to finish.
    ///
    /// Returns `None` if `name` is not running. Stopping a task that is
    /// already stopping returns its completion handle again.
    ///
    /// A name that is still binding its listeners is not running yet: the
    /// call returns `None`, nothing is recorded, and the start then completes
    /// with the task running. Callers that race a start must check the result
    /// and stop again once `is_running` reports the task.
    pub fn stop_task(&self, name: &str) -> Option<TaskCompletion> {
        let tasks = self.lock();
        match tasks.get(name) {
            Some(TaskSlot::Running { task, .. }) => {
                task.stop();
                Some(task.completion())
            }
            Some(TaskSlot::Starting) | None => {
                debug!(task = %name, "Stop requested for task that is not running");
                None
            }
        }
    }

    /// Whether `name` has a running task.
    ///
    /// A stopped task counts as running until all its forwarders have exited.
    pub fn is_running(&self, name: &str) -> bool {
        matches!(self.lock().get(name), Some(TaskSlot::Running { .. }))
    }

    /// Task configs known to the catalog.
    pub fn list(&self) -> Vec<TaskConfig> {
        self.catalog.tasks()
    }

    /// Names of running tasks, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, TaskSlot::Running { .. }))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Counters of a running task.
    pub fn stats(&self, name: &str) -> Option<TaskStatsSnapshot> {
        self.task(name).map(|task| task.stats())
    }

    /// Bound listener addresses of a running task.
    pub fn local_addrs(&self, name: &str) -> Option<Vec<SocketAddr>> {
        self.task(name).map(|task| task.local_addrs().to_vec())
    }

    /// Completion handle of a running task, without stopping it.
    pub fn completion(&self, name: &str) -> Option<TaskCompletion> {
        self.task(name).map(|task| task.completion())
    }

    /// Stop every running task without waiting.
    pub fn stop_all(&self) -> Vec<TaskCompletion> {
        let tasks = self.lock();
        tasks
            .values()
            .filter_map(|slot| match slot {
                TaskSlot::Running { task, .. } => {
                    task.stop();
                    Some(task.completion())
                }
                TaskSlot::Starting => None,
            })
            .collect()
    }

    /// Stop every running task and wait until all of them have finished.
    pub async fn shutdown(&self) {
        let completions = self.stop_all();
        if completions.is_empty() {
            return;
        }
        info!(tasks = completions.len(), "Shutting down tasks");
        for completion in completions {
            completion.wait().await;
        }
        info!("All tasks stopped");
    }

    fn task(&self, name: &str) -> Option<Arc<ProxyTask>> {
        match self.lock().get(name) {
            Some(TaskSlot::Running { task, .. }) => Some(Arc::clone(task)),
            _ => None,
        }
    }

    fn reserve(&self, name: &str) -> Result<Reservation<'_>> {
        let mut tasks = self.lock();
        if tasks.contains_key(name) {
            return Err(Error::DuplicateTask {
                name: name.to_string(),
            });
        }
        tasks.insert(name.to_string(), TaskSlot::Starting);
        Ok(Reservation {
            registry: self,
            name: name.to_string(),
            committed: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, TaskMap> {
        lock_map(&self.tasks)
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let tasks = lock_map(&self.tasks);
        for slot in tasks.values() {
            if let TaskSlot::Running { task, .. } = slot {
                task.stop();
            }
        }
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("running", &self.running())
            .field("config", &self.config)
            .finish()
    }
}

/// Holds a `Starting` slot; removes it on drop unless committed.
struct Reservation<'a> {
    registry: &'a TaskRegistry,
    name: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut tasks = self.registry.lock();
        if matches!(tasks.get(&self.name), Some(TaskSlot::Starting)) {
            tasks.remove(&self.name);
        }
    }
}

fn lock_map(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Completion callback body: drop the entry if it is still this generation.
fn remove_if_current(tasks: &Weak<Mutex<TaskMap>>, name: &str, id: u64) {
    let Some(tasks) = tasks.upgrade() else {
        return;
    };
    let mut tasks = lock_map(&tasks);
    if matches!(tasks.get(name), Some(TaskSlot::Running { id: current, .. }) if *current == id) {
        tasks.remove(name);
        debug!(task = %name, id, "Task removed from registry");
    }
}
