//! Proxy task: a named set of port forwarders toward one host.
//!
//! Starting a task is split in two phases so the registry can make a start
//! atomic:
//! - [`ProxyTask::bind`] validates the config and binds every listener. If any
//!   bind fails, the listeners already bound are dropped and nothing runs.
//! - [`PendingTask::launch`] spawns the forwarders and a supervisor that
//!   reports completion once all of them have exited.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cancel::StopSignal;
use crate::config::{RelayConfig, TaskConfig};
use crate::error::Result;

use super::forwarder::{ForwarderExit, PortForwarder};
use super::{TaskContext, TaskStats, TaskStatsSnapshot};

/// A running (or stopping) task.
///
/// Dropping the last handle stops the task.
pub struct ProxyTask {
    config: TaskConfig,
    cancel: StopSignal,
    stats: Arc<TaskStats>,
    local_addrs: Vec<SocketAddr>,
    done: watch::Receiver<bool>,
}

impl ProxyTask {
    /// Validate `config` and bind one listener per port mapping.
    ///
    /// Binding is all-or-nothing: on the first failure every listener bound
    /// so far is closed and the bind error is returned.
    pub async fn bind(config: TaskConfig, relay: &RelayConfig) -> Result<PendingTask> {
        config.validate()?;
        relay.validate()?;

        let cancel = StopSignal::new();
        let stats = Arc::new(TaskStats::default());
        let ctx = TaskContext {
            name: Arc::from(config.name.as_str()),
            host: Arc::from(config.host.as_str()),
            cancel: cancel.clone(),
            stats: Arc::clone(&stats),
            buffer_size: relay.buffer_size,
        };

        let mut forwarders = Vec::with_capacity(config.ports.len());
        for mapping in &config.ports {
            match PortForwarder::bind(ctx.clone(), *mapping, relay.listen_addr).await {
                Ok(forwarder) => forwarders.push(forwarder),
                Err(e) => {
                    warn!(
                        task = %config.name,
                        listen_port = mapping.from,
                        target = %config.target(mapping),
                        released = forwarders.len(),
                        error = %e,
                        "Task start failed, releasing bound ports"
                    );
                    return Err(e);
                }
            }
        }

        let local_addrs = forwarders
            .iter()
            .map(PortForwarder::local_addr)
            .collect::<Result<Vec<_>>>()?;

        let (done_tx, done) = watch::channel(false);
        let task = Arc::new(ProxyTask {
            config,
            cancel,
            stats,
            local_addrs,
            done,
        });

        Ok(PendingTask {
            task,
            forwarders,
            done_tx,
        })
    }

    /// Bind and launch in one step.
    ///
    /// `on_complete` runs once every forwarder has exited, before the
    /// completion handle resolves.
    pub async fn start<F>(
        config: TaskConfig,
        relay: &RelayConfig,
        on_complete: F,
    ) -> Result<Arc<ProxyTask>>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(Self::bind(config, relay).await?.launch(on_complete))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Trigger the task's stop signal without waiting.
    ///
    /// Returns `true` for the call that actually stopped the task.
    pub fn stop(&self) -> bool {
        let first = self.cancel.trigger();
        if first {
            info!(task = %self.config.name, "Stopping task");
        }
        first
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_triggered()
    }

    /// Whether every forwarder has exited.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Handle that resolves once the task has finished.
    pub fn completion(&self) -> TaskCompletion {
        TaskCompletion {
            rx: self.done.clone(),
        }
    }

    pub fn stats(&self) -> TaskStatsSnapshot {
        self.stats.snapshot()
    }

    /// Addresses of the bound listeners, in mapping order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }
}

impl Drop for ProxyTask {
    fn drop(&mut self) {
        self.cancel.trigger();
    }
}

impl std::fmt::Debug for ProxyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTask")
            .field("name", &self.config.name)
            .field("host", &self.config.host)
            .field("local_addrs", &self.local_addrs)
            .field("stopping", &self.is_stopping())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// A task whose listeners are bound but whose forwarders are not running yet.
///
/// Dropping it closes every listener.
pub struct PendingTask {
    task: Arc<ProxyTask>,
    forwarders: Vec<PortForwarder>,
    done_tx: watch::Sender<bool>,
}

impl PendingTask {
    pub fn task(&self) -> &Arc<ProxyTask> {
        &self.task
    }

    /// Spawn one accept loop per listener plus the task supervisor.
    pub fn launch<F>(self, on_complete: F) -> Arc<ProxyTask>
    where
        F: FnOnce() + Send + 'static,
    {
        self.launch_with(on_complete, PortForwarder::run)
    }

    /// Launch with `run` driving each forwarder.
    pub(crate) fn launch_with<F, R, Fut>(self, on_complete: F, run: R) -> Arc<ProxyTask>
    where
        F: FnOnce() + Send + 'static,
        R: Fn(PortForwarder) -> Fut,
        Fut: Future<Output = ForwarderExit> + Send + 'static,
    {
        let PendingTask {
            task,
            forwarders,
            done_tx,
        } = self;

        let mut running = JoinSet::new();
        for forwarder in forwarders {
            running.spawn(run(forwarder));
        }

        info!(
            task = %task.config.name,
            host = %task.config.host,
            ports = running.len(),
            "Task started"
        );

        tokio::spawn(supervise(
            task.config.name.clone(),
            running,
            on_complete,
            done_tx,
        ));
        task
    }
}

/// Wait for every forwarder to exit, then run `on_complete` and signal
/// completion, in that order.
///
/// Forwarders that fail or panic end only themselves; the task completes
/// once the last one has exited, whatever the reason.
pub(crate) async fn supervise<F>(
    name: String,
    mut running: JoinSet<ForwarderExit>,
    on_complete: F,
    done_tx: watch::Sender<bool>,
) where
    F: FnOnce() + Send + 'static,
{
    let mut failed = 0usize;
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok(ForwarderExit::Cancelled) => {}
            Ok(ForwarderExit::Failed(e)) => {
                failed += 1;
                warn!(task = %name, error = %e, "Port forwarder exited with error");
            }
            Err(e) => {
                failed += 1;
                error!(task = %name, error = %e, "Port forwarder panicked");
            }
        }
    }

    debug!(task = %name, failed, "All port forwarders exited");
    on_complete();
    done_tx.send_replace(true);
    info!(task = %name, "Task stopped");
}

impl std::fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTask")
            .field("task", &self.task)
            .field("listeners", &self.forwarders.len())
            .finish()
    }
}

/// Out-of-band completion signal of a task.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    rx: watch::Receiver<bool>,
}

impl TaskCompletion {
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until every forwarder and relay of the task has finished.
    pub async fn wait(mut self) {
        // A closed channel means the supervisor is gone, which only happens
        // after it has finished or the runtime is shutting down.
        let _ = self.rx.wait_for(|done| *done).await;
    }
}
