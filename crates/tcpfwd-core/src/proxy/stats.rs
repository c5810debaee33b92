//! Per-task connection and byte counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by forwarders and relays.
#[derive(Debug, Default)]
pub(crate) struct TaskStats {
    open_connections: AtomicU64,
    total_connections: AtomicU64,
    dial_failures: AtomicU64,
    bytes_to_target: AtomicU64,
    bytes_to_client: AtomicU64,
}

impl TaskStats {
    /// Record an accepted connection.
    ///
    /// Returns the connection id and a guard that keeps the connection counted
    /// as open until dropped.
    pub fn connection_opened(self: &Arc<Self>) -> (u64, OpenConnection) {
        let id = self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.open_connections.fetch_add(1, Ordering::AcqRel);
        (
            id,
            OpenConnection {
                stats: Arc::clone(self),
            },
        )
    }

    pub fn dial_failed(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_to_target(&self) -> &AtomicU64 {
        &self.bytes_to_target
    }

    pub fn bytes_to_client(&self) -> &AtomicU64 {
        &self.bytes_to_client
    }

    pub fn snapshot(&self) -> TaskStatsSnapshot {
        TaskStatsSnapshot {
            open_connections: self.open_connections.load(Ordering::Acquire),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            bytes_to_target: self.bytes_to_target.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
        }
    }
}

/// Keeps one accepted connection counted as open.
#[derive(Debug)]
pub(crate) struct OpenConnection {
    stats: Arc<TaskStats>,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.stats.open_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time copy of a task's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatsSnapshot {
    /// Accepted connections whose sockets are not closed yet.
    pub open_connections: u64,
    /// Connections accepted since the task started.
    pub total_connections: u64,
    /// Accepted connections dropped because the target could not be dialed.
    pub dial_failures: u64,
    /// Bytes relayed from clients to the target.
    pub bytes_to_target: u64,
    /// Bytes relayed from the target back to clients.
    pub bytes_to_client: u64,
}
