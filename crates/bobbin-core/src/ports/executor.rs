//! Executor port - the execution collaborator.
//!
//! The scheduler hands an admitted task to the executor on its own tokio
//! task and feeds the returned `Outcome` back into `on_task_finished`.
//! It never waits on a run while holding a lock.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::data::{Data, DataError};
use crate::domain::ids::TaskId;
use crate::domain::outcome::Outcome;
use crate::domain::task::WorkType;

/// What the executor gets for one run.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: TaskId,
    pub work_type: WorkType,
    pub input: Data,
    /// Retries requested so far (0 on the first run).
    pub attempt: u32,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, item: WorkItem, ctx: WorkContext) -> Outcome;

    /// Checked at submission; unsupported work types are rejected.
    fn supports(&self, _work_type: &WorkType) -> bool {
        true
    }
}

/// Receives progress updates for a running task.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report_progress(&self, id: TaskId, progress: Data);
}

/// Per-run handle given to the executor.
#[derive(Clone)]
pub struct WorkContext {
    id: TaskId,
    cancel: watch::Receiver<bool>,
    progress: Option<Arc<dyn ProgressSink>>,
    max_data_bytes: usize,
}

impl WorkContext {
    pub fn new(
        id: TaskId,
        cancel: watch::Receiver<bool>,
        progress: Arc<dyn ProgressSink>,
        max_data_bytes: usize,
    ) -> Self {
        Self {
            id,
            cancel,
            progress: Some(progress),
            max_data_bytes,
        }
    }

    /// Context not attached to a scheduler: progress goes nowhere and the
    /// run is never cancelled. Handy for calling handlers directly.
    pub fn detached(id: TaskId) -> Self {
        // The sender is dropped right away; `cancelled()` treats that as
        // "never cancelled".
        let (_tx, cancel) = watch::channel(false);
        Self {
            id,
            cancel,
            progress: None,
            max_data_bytes: crate::domain::data::MAX_DATA_BYTES,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.id
    }

    /// Publish incremental progress. Relayed verbatim to observers.
    pub async fn set_progress(&self, progress: Data) -> Result<(), DataError> {
        progress.check(self.max_data_bytes)?;
        if let Some(sink) = &self.progress {
            sink.report_progress(self.id, progress).await;
        }
        Ok(())
    }

    /// Advisory: the task was cancelled while running. Finishing anyway is
    /// allowed; the result is discarded.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the task is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        if rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for WorkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkContext")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
