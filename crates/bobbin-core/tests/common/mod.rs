//! Test harness: an executor that never finishes on its own, so each test
//! decides when and how a run ends via `on_task_finished`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use bobbin_core::Scheduler;
use bobbin_core::config::SchedulerConfig;
use bobbin_core::domain::{
    Outcome, StoreError, TaskId, TaskRecord, TaskSnapshot, TaskSpec, TaskState, WorkType,
};
use bobbin_core::impls::InMemoryTaskStore;
use bobbin_core::ports::{Executor, TaskStore, WorkContext, WorkItem};

pub const UNSUPPORTED: &str = "unsupported";

pub struct ManualExecutor {
    started: mpsc::UnboundedSender<(WorkItem, WorkContext)>,
}

#[async_trait]
impl Executor for ManualExecutor {
    async fn execute(&self, item: WorkItem, ctx: WorkContext) -> Outcome {
        let _ = self.started.send((item, ctx));
        std::future::pending().await
    }

    fn supports(&self, work_type: &WorkType) -> bool {
        work_type.as_str() != UNSUPPORTED
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    started: mpsc::UnboundedReceiver<(WorkItem, WorkContext)>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryTaskStore::new()))
    }

    pub fn with_store(config: SchedulerConfig, store: Arc<dyn TaskStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::builder()
            .executor(Arc::new(ManualExecutor { started: tx }))
            .store(store)
            .config(config)
            .build()
            .unwrap();
        Self {
            scheduler,
            started: rx,
        }
    }

    /// Dispatch everything due and return the started runs, sorted by id.
    pub async fn run_ready(&mut self) -> Vec<(WorkItem, WorkContext)> {
        let n = self.scheduler.dispatch_ready().await.unwrap();
        let mut runs = Vec::with_capacity(n);
        for _ in 0..n {
            runs.push(self.started.recv().await.unwrap());
        }
        runs.sort_by_key(|(item, _)| item.id);
        runs
    }

    pub async fn run_ready_ids(&mut self) -> Vec<TaskId> {
        self.run_ready()
            .await
            .into_iter()
            .map(|(item, _)| item.id)
            .collect()
    }

    pub async fn finish(&self, id: TaskId, outcome: Outcome) {
        self.scheduler.on_task_finished(id, outcome).await.unwrap();
    }

    pub async fn snapshot(&self, id: TaskId) -> TaskSnapshot {
        self.scheduler.get(id).await.unwrap().unwrap()
    }

    pub async fn state(&self, id: TaskId) -> TaskState {
        self.snapshot(id).await.state
    }
}

pub fn task(work_type: &str) -> TaskSpec {
    TaskSpec::new(work_type)
}

pub fn sorted(mut ids: Vec<TaskId>) -> Vec<TaskId> {
    ids.sort();
    ids
}

/// In-memory store with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryTaskStore,
    broken_loads: Mutex<HashSet<TaskId>>,
    /// Saves left before every further save fails.
    saves_left: Mutex<Option<u32>>,
}

impl FaultyStore {
    /// Loads of `id` fail as if the backend were down.
    pub fn break_load(&self, id: TaskId) {
        self.broken_loads.lock().unwrap().insert(id);
    }

    /// Let `n` saves through, then reject saves permanently.
    pub fn fail_saves_after(&self, n: u32) {
        *self.saves_left.lock().unwrap() = Some(n);
    }

    pub fn heal(&self) {
        self.broken_loads.lock().unwrap().clear();
        *self.saves_left.lock().unwrap() = None;
    }
}

#[async_trait]
impl TaskStore for FaultyStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        {
            let mut left = self.saves_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(StoreError::permanent("disk full")),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.save(record).await
    }

    async fn compare_and_set(
        &self,
        expected: TaskState,
        record: &TaskRecord,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_set(expected, record).await
    }

    async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        if self.broken_loads.lock().unwrap().contains(&id) {
            return Err(StoreError::unavailable("connection refused"));
        }
        self.inner.load(id).await
    }

    async fn load_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_by_tag(tag).await
    }

    async fn load_by_unique_name(&self, name: &str) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_by_unique_name(name).await
    }

    async fn load_active(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_active().await
    }

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.load_all().await
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn delete_terminal(&self) -> Result<Vec<TaskId>, StoreError> {
        self.inner.delete_terminal().await
    }
}
