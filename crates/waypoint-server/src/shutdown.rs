//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the listener, subscriber loops and
/// dispatch tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for `tracker` to drain.
    ///
    /// Returns `true` when every tracked task finished in time.
    pub async fn graceful_shutdown(&self, tracker: &TaskTracker, timeout: Duration) -> bool {
        self.shutdown();
        let _ = tracker.close();
        info!(
            task_count = tracker.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for in-flight tasks"
        );

        if tokio::time::timeout(timeout, tracker.wait()).await.is_ok() {
            true
        } else {
            warn!(
                remaining = tracker.len(),
                "shutdown timed out after {timeout:?}, abandoning in-flight tasks"
            );
            false
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent_and_propagates() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_tracker() {
        let coord = ShutdownCoordinator::new();
        let tracker = TaskTracker::new();
        let token = coord.token();
        let _ = tracker.spawn(async move {
            token.cancelled().await;
        });

        assert!(coord.graceful_shutdown(&tracker, Duration::from_secs(5)).await);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let tracker = TaskTracker::new();
        let _ = tracker.spawn(std::future::pending::<()>());

        assert!(!coord.graceful_shutdown(&tracker, Duration::from_millis(100)).await);
        assert!(coord.is_shutting_down());
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn empty_tracker_drains_immediately() {
        let coord = ShutdownCoordinator::default();
        let tracker = TaskTracker::new();
        assert!(coord.graceful_shutdown(&tracker, Duration::from_secs(1)).await);
    }
}
