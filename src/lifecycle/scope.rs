use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument};

/// Cancellable supervisor scope for background work.
///
/// Tasks are independent: one that fails or panics leaves its siblings
/// running. Cancelling a scope cancels every child scope; cancelling a child
/// leaves the parent alone. All scopes derived from one root share a tracker,
/// so [`TaskScope::shutdown`] on the root waits for the whole tree.
#[derive(Debug, Clone)]
pub struct TaskScope {
    name: String,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TaskScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        Self {
            name: format!("{}/{}", self.name, name.into()),
            token: self.token.child_token(),
            tracker: self.tracker.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Spawn `future` in this scope. It resolves to `None` when the scope was
    /// cancelled before the future finished.
    pub fn spawn<F>(&self, task: &str, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        let span = tracing::debug_span!("task", scope = %self.name, task);

        self.tracker.spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Task cancelled");
                        None
                    }
                    output = future => Some(output),
                }
            }
            .instrument(span),
        )
    }

    /// Cancel the scope and wait up to `timeout` for its tasks to finish.
    /// Returns whether every task finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();

        let finished = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            warn!(scope = %self.name, tasks = self.tracker.len(), "Tasks still running after shutdown timeout");
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_task_does_not_cancel_siblings() {
        let scope = TaskScope::new("test");
        let failing = scope.spawn("failing", async { Err::<(), _>("boom") });
        let sibling = scope.spawn("sibling", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            42
        });

        assert_eq!(failing.await.unwrap(), Some(Err("boom")));
        assert_eq!(sibling.await.unwrap(), Some(42));
        assert!(!scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_cancel_siblings() {
        let scope = TaskScope::new("test");
        let panicking = scope.spawn("panicking", async { panic!("task failure") });
        let sibling = scope.spawn("sibling", async { "done" });

        assert!(panicking.await.is_err());
        assert_eq!(sibling.await.unwrap(), Some("done"));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_children() {
        let scope = TaskScope::new("root");
        let child = scope.child("remote");
        let handle = child.spawn("pending", std::future::pending::<()>());

        scope.cancel();

        assert_eq!(handle.await.unwrap(), None);
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancellation_leaves_parent_running() {
        let scope = TaskScope::new("root");
        let child = scope.child("remote");

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!scope.is_cancelled());
        assert_eq!(child.name(), "root/remote");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_waits_for_tasks() {
        let scope = TaskScope::new("root");
        let handle = scope
            .child("worker")
            .spawn("pending", std::future::pending::<()>());

        assert!(scope.shutdown(Duration::from_secs(1)).await);
        assert!(scope.is_cancelled());
        assert_eq!(handle.await.unwrap(), None);
    }
}
