use std::time::Duration;

use tracing::warn;

use super::TaskStore;
use crate::error::StoreError;
use crate::task::GenerationTask;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const MAX_BACKOFF_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as u64;
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(base.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, 200)
    }
}

/// Upserts `task`, retrying with backoff. Returns the last error once attempts
/// run out. A conflict is returned at once: retrying cannot resolve it.
pub async fn persist_with_retry(
    store: &dyn TaskStore,
    task: &GenerationTask,
    policy: RetryPolicy,
) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match store.upsert(task).await {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_conflict() && attempt < policy.attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    task_id = %task.id,
                    store = store.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "persist failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SubjectType, TaskFilter, TaskRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyStore {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get(&self, _task_id: &str) -> Result<Option<GenerationTask>, StoreError> {
            Ok(None)
        }

        async fn upsert(&self, _task: &GenerationTask) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Backend("disk full".into()));
            }
            Ok(())
        }

        async fn list(&self, _filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError> {
            Ok(vec![])
        }
    }

    fn task() -> GenerationTask {
        GenerationTask::new(TaskRequest::new("Alpha", SubjectType::World))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::new(3, 100);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(30), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(RetryPolicy::new(0, 1).attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let store = FlakyStore {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        tokio_test::assert_ok!(persist_with_retry(&store, &task(), RetryPolicy::new(3, 1)).await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let store = FlakyStore {
            failures: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        };
        let res = persist_with_retry(&store, &task(), RetryPolicy::new(2, 1)).await;
        tokio_test::assert_err!(res);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    struct SettledStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskStore for SettledStore {
        fn name(&self) -> &str {
            "settled"
        }

        async fn get(&self, _task_id: &str) -> Result<Option<GenerationTask>, StoreError> {
            Ok(None)
        }

        async fn upsert(&self, task: &GenerationTask) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict {
                task_id: task.id.clone(),
                status: crate::task::TaskStatus::Cancelled,
            })
        }

        async fn list(&self, _filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() {
        let store = SettledStore {
            calls: AtomicU32::new(0),
        };
        let res = persist_with_retry(&store, &task(), RetryPolicy::new(5, 1)).await;
        assert!(res.unwrap_err().is_conflict());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
