//! One-shot stop signal shared by a task and everything it spawns.
//!
//! A [`StopSignal`] starts unset and can be triggered exactly once. Any number
//! of clones may wait on it concurrently; redundant triggers are no-ops.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Idempotent, multi-observer stop notification.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Create a new, unset signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal.
    ///
    /// Returns `true` only for the call that performed the Unset -> Set
    /// transition; every later call returns `false` and changes nothing.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    /// Check whether the signal has been set.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is set.
    ///
    /// Resolves immediately if it already is. Cancel-safe: dropping the
    /// future before completion has no effect on the signal.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_unset() {
        let signal = StopSignal::new();
        assert!(!signal.is_triggered());
    }

    #[test]
    fn trigger_is_one_shot() {
        let signal = StopSignal::new();
        assert!(signal.trigger());
        assert!(signal.is_triggered());

        // Redundant triggers are no-ops
        assert!(!signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn clones_share_state() {
        let signal = StopSignal::new();
        let observer = signal.clone();

        assert!(observer.trigger());
        assert!(signal.is_triggered());
        assert!(!signal.trigger());
    }

    #[tokio::test]
    async fn triggered_resolves_after_trigger() {
        let signal = StopSignal::new();
        let observer = signal.clone();

        let waiter = tokio::spawn(async move { observer.triggered().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("observer should wake up")
            .unwrap();
    }

    #[tokio::test]
    async fn triggered_resolves_immediately_when_set() {
        let signal = StopSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .expect("already-set signal should not block");
    }

    #[tokio::test]
    async fn many_observers_wake() {
        let signal = StopSignal::new();
        let waiters: Vec<_> = (0..16)
            .map(|_| {
                let observer = signal.clone();
                tokio::spawn(async move { observer.triggered().await })
            })
            .collect();

        signal.trigger();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(2), waiter)
                .await
                .expect("every observer should wake up")
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_transition_once() {
        let signal = StopSignal::new();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let s = signal.clone();
                tokio::spawn(async move { s.trigger() })
            })
            .collect();

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap() {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
        assert!(signal.is_triggered());
    }
}
