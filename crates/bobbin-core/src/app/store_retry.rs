//! Bounded retry around the Work Record Store.
//!
//! Retryable store failures (transient / infrastructure) are retried with
//! exponential backoff up to `store_retry.max_attempts`. Permanent failures
//! and exhausted budgets surface as `SchedulerError::Store`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::StoreRetryConfig;
use crate::domain::errors::{SchedulerError, StoreError};
use crate::domain::ids::TaskId;
use crate::domain::state::TaskState;
use crate::domain::task::TaskRecord;
use crate::ports::TaskStore;

#[derive(Clone)]
pub(crate) struct RetryingStore {
    inner: Arc<dyn TaskStore>,
    policy: StoreRetryConfig,
}

impl RetryingStore {
    pub(crate) fn new(inner: Arc<dyn TaskStore>, policy: StoreRetryConfig) -> Self {
        Self { inner, policy }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.policy
            .base_delay()
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, SchedulerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(operation, attempt, ?delay, error = %e, "store operation failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(operation, attempts = attempt, error = %e, "store operation failed");
                    return Err(SchedulerError::Store {
                        operation,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    pub(crate) async fn save(&self, record: &TaskRecord) -> Result<(), SchedulerError> {
        self.run("save", || self.inner.save(record)).await
    }

    pub(crate) async fn compare_and_set(
        &self,
        expected: TaskState,
        record: &TaskRecord,
    ) -> Result<bool, SchedulerError> {
        self.run("compare_and_set", || {
            self.inner.compare_and_set(expected, record)
        })
        .await
    }

    pub(crate) async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>, SchedulerError> {
        self.run("load", || self.inner.load(id)).await
    }

    pub(crate) async fn load_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.run("load_by_tag", || self.inner.load_by_tag(tag)).await
    }

    pub(crate) async fn load_by_unique_name(
        &self,
        name: &str,
    ) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.run("load_by_unique_name", || self.inner.load_by_unique_name(name))
            .await
    }

    pub(crate) async fn load_active(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.run("load_active", || self.inner.load_active()).await
    }

    pub(crate) async fn load_all(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.run("load_all", || self.inner.load_all()).await
    }

    pub(crate) async fn delete(&self, id: TaskId) -> Result<bool, SchedulerError> {
        self.run("delete", || self.inner.delete(id)).await
    }

    pub(crate) async fn delete_terminal(&self) -> Result<Vec<TaskId>, SchedulerError> {
        self.run("delete_terminal", || self.inner.delete_terminal()).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A store that fails a configurable number of calls before delegating.

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::errors::ErrorKind;
    use crate::impls::InMemoryTaskStore;

    pub(crate) struct FlakyStore {
        pub(crate) inner: InMemoryTaskStore,
        failures_left: AtomicU32,
        kind: ErrorKind,
        pub(crate) calls: AtomicU32,
    }

    impl FlakyStore {
        pub(crate) fn new(failures: u32, kind: ErrorKind) -> Self {
            Self {
                inner: InMemoryTaskStore::new(),
                failures_left: AtomicU32::new(failures),
                kind,
                calls: AtomicU32::new(0),
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::new(self.kind, "injected failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.check()?;
            self.inner.save(record).await
        }
        async fn compare_and_set(
            &self,
            expected: TaskState,
            record: &TaskRecord,
        ) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.compare_and_set(expected, record).await
        }
        async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
            self.check()?;
            self.inner.load(id).await
        }
        async fn load_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, StoreError> {
            self.check()?;
            self.inner.load_by_tag(tag).await
        }
        async fn load_by_unique_name(&self, name: &str) -> Result<Vec<TaskRecord>, StoreError> {
            self.check()?;
            self.inner.load_by_unique_name(name).await
        }
        async fn load_active(&self) -> Result<Vec<TaskRecord>, StoreError> {
            self.check()?;
            self.inner.load_active().await
        }
        async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
            self.check()?;
            self.inner.load_all().await
        }
        async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.delete(id).await
        }
        async fn delete_terminal(&self) -> Result<Vec<TaskId>, StoreError> {
            self.check()?;
            self.inner.delete_terminal().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::FlakyStore;
    use super::*;
    use crate::domain::errors::ErrorKind;

    fn policy(max_attempts: u32) -> StoreRetryConfig {
        StoreRetryConfig {
            max_attempts,
            base_delay_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let flaky = Arc::new(FlakyStore::new(2, ErrorKind::Transient));
        let store = RetryingStore::new(flaky.clone(), policy(5));

        assert!(store.load_all().await.unwrap().is_empty());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_is_reported() {
        let flaky = Arc::new(FlakyStore::new(10, ErrorKind::Infrastructure));
        let store = RetryingStore::new(flaky.clone(), policy(3));

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Store {
                operation: "load_all",
                attempts: 3,
                ..
            }
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let flaky = Arc::new(FlakyStore::new(1, ErrorKind::Permanent));
        let store = RetryingStore::new(flaky.clone(), policy(5));

        assert!(store.delete_terminal().await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_grow_exponentially() {
        let store = RetryingStore::new(Arc::new(FlakyStore::new(0, ErrorKind::Transient)), policy(5));
        assert_eq!(store.delay_for(1), Duration::from_millis(10));
        assert_eq!(store.delay_for(2), Duration::from_millis(20));
        assert_eq!(store.delay_for(3), Duration::from_millis(40));
    }
}
