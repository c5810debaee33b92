//! Foreground wait of the binary: run until interrupted or until no task is
//! left.

use std::future::Future;

use tcpfwd_core::TaskRegistry;
use tracing::debug;

/// Why [`wait_for_exit`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The interrupt future resolved first.
    Interrupted,
    /// Every task that was running has finished on its own.
    TasksEnded,
}

/// Wait for `interrupt` or for every currently running task to finish.
///
/// Tasks started after the call are not waited for. With no running task
/// this returns [`Exit::TasksEnded`] unless `interrupt` is already ready.
pub async fn wait_for_exit<I>(registry: &TaskRegistry, interrupt: I) -> Exit
where
    I: Future<Output = ()>,
{
    let completions: Vec<_> = registry
        .running()
        .iter()
        .filter_map(|name| registry.completion(name))
        .collect();
    debug!(tasks = completions.len(), "Waiting for interrupt or task completion");

    let all_ended = async move {
        for completion in completions {
            completion.wait().await;
        }
    };

    tokio::select! {
        biased;

        _ = interrupt => Exit::Interrupted,
        _ = all_ended => Exit::TasksEnded,
    }
}
