//! Polling helper for asynchronous state changes.

use std::time::Duration;

use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll `cond` until it returns true or `timeout` elapses.
///
/// Returns the last value of `cond`.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return cond();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn returns_true_when_condition_becomes_true() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.store(true, Ordering::SeqCst);
        });

        assert!(wait_until(Duration::from_secs(2), || flag.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn returns_false_on_timeout() {
        assert!(!wait_until(Duration::from_millis(30), || false).await);
    }
}
