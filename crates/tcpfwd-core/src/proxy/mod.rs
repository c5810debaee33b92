//! Forwarding engine.
//!
//! Flow for one task:
//! 1. Bind one listener per port mapping (all or nothing)
//! 2. Launch one forwarder per listener
//! 3. Each accepted connection dials `host:to` and runs a relay
//! 4. On stop, forwarders drop their listeners and relays close both sockets
//! 5. Once every forwarder has exited the task reports completion

mod forwarder;
mod relay;
mod stats;
mod task;

use std::sync::Arc;

use crate::cancel::StopSignal;
use crate::config::host_port;

pub use stats::TaskStatsSnapshot;
pub use task::{PendingTask, ProxyTask, TaskCompletion};

#[cfg(test)]
pub(crate) use forwarder::ForwarderExit;
pub(crate) use stats::TaskStats;

/// State shared by the forwarders and relays of one task.
#[derive(Debug, Clone)]
pub(crate) struct TaskContext {
    /// Task name, for logging.
    pub name: Arc<str>,
    /// Host every mapping dials.
    pub host: Arc<str>,
    /// The task's stop signal.
    pub cancel: StopSignal,
    /// Counters for the task.
    pub stats: Arc<TaskStats>,
    /// Copy buffer size per relay direction.
    pub buffer_size: usize,
}

impl TaskContext {
    /// Display form of `host:port`.
    pub fn target(&self, port: u16) -> String {
        host_port(&self.host, port)
    }
}
