//! Scheduler Core.
//!
//! Owns the task lifecycle: submission and dedup resolution, DAG readiness,
//! constraint-gated dispatch, retry/backoff and cancellation. Every state
//! change of a task happens under its DAG group lock and is persisted with
//! a compare-and-set on the previous state before it is published.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::builder::SchedulerBuilder;
use super::dispatcher::Dispatcher;
use super::locks::{KeyedLocks, LockKey};
use super::observer::{Filter, ObservationHub, Subscription};
use super::queue::ReadyQueue;
use super::status::StateCounts;
use super::store_retry::RetryingStore;
use crate::config::SchedulerConfig;
use crate::domain::constraints::{Environment, is_satisfied};
use crate::domain::data::Data;
use crate::domain::decision::{Decider, Decision};
use crate::domain::errors::{SchedulerError, ValidationError};
use crate::domain::events::TaskSnapshot;
use crate::domain::ids::TaskId;
use crate::domain::outcome::Outcome;
use crate::domain::state::TaskState;
use crate::domain::task::{OutOfQuotaPolicy, TaskRecord, TaskSpec};
use crate::domain::unique::{DedupResolution, ExistingWorkPolicy, UniqueSubmission};
use crate::graph::{GraphNode, WorkGraph};
use crate::ports::{Clock, Executor, IdGenerator, ProgressSink, TaskStore, WorkContext, WorkItem};

/// Upper bound for timers; keeps `Instant` arithmetic from overflowing.
const MAX_TIMER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Wiring handed over by the builder.
pub(crate) struct Parts {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) decider: Arc<dyn Decider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) config: SchedulerConfig,
    pub(crate) environment: Environment,
}

/// An admitted run.
struct RunEntry {
    cancel: watch::Sender<bool>,
    expedited: bool,
}

enum Admission {
    Run {
        cancel: watch::Receiver<bool>,
        expedited: bool,
    },
    Drop,
}

/// Whether a Blocked task's prerequisites allow it to run.
enum Readiness {
    Ready,
    Waiting,
    /// A prerequisite ended without succeeding.
    Doomed(TaskId),
}

/// What `recover` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted runs put back to Enqueued.
    pub requeued: usize,
    /// Enqueued tasks whose timers were re-armed.
    pub rearmed: usize,
    /// Blocked tasks whose prerequisites had already succeeded.
    pub released: usize,
    /// Blocked tasks still waiting.
    pub blocked: usize,
    /// Tasks cancelled because a prerequisite had failed.
    pub cancelled: usize,
}

struct Inner {
    store: RetryingStore,
    executor: Arc<dyn Executor>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: SchedulerConfig,
    locks: KeyedLocks,
    queue: ReadyQueue,
    hub: Arc<ObservationHub>,
    environment: RwLock<Environment>,
    running: Mutex<HashMap<TaskId, RunEntry>>,
    seq: AtomicU64,
}

/// Handle to the scheduler. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(parts: Parts) -> Self {
        let store = RetryingStore::new(parts.store, parts.config.store_retry.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                executor: parts.executor,
                decider: parts.decider,
                clock: parts.clock,
                ids: parts.ids,
                config: parts.config,
                locks: KeyedLocks::new(),
                queue: ReadyQueue::new(),
                hub: Arc::new(ObservationHub::new()),
                environment: RwLock::new(parts.environment),
                running: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // submission
    // ------------------------------------------------------------------

    pub async fn submit(&self, spec: TaskSpec) -> Result<TaskId, SchedulerError> {
        let ids = self.submit_graph(WorkGraph::single(spec)).await?;
        ids.first()
            .copied()
            .ok_or(SchedulerError::Validation(ValidationError::EmptyBatch))
    }

    /// Each spec depends on its predecessor. Returns ids in chain order.
    pub async fn submit_chain(
        &self,
        specs: impl IntoIterator<Item = TaskSpec>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        self.submit_graph(WorkGraph::chain(specs)?).await
    }

    /// Returns the parallel ids followed by the join id.
    pub async fn submit_fan_in(
        &self,
        parallel: impl IntoIterator<Item = TaskSpec>,
        join: TaskSpec,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        self.submit_graph(WorkGraph::fan_in(parallel, join)?).await
    }

    /// Returns ids in node order.
    pub async fn submit_graph(&self, graph: WorkGraph) -> Result<Vec<TaskId>, SchedulerError> {
        self.validate_graph(&graph)?;
        self.insert_fresh(graph, None).await
    }

    pub async fn submit_unique(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        spec: TaskSpec,
    ) -> Result<UniqueSubmission, SchedulerError> {
        self.submit_unique_graph(name, policy, WorkGraph::single(spec))
            .await
    }

    /// Resolve `name` against existing work, then submit. The name is
    /// attached to every node of `graph`.
    ///
    /// Append chains the graph's roots after the most recently created task
    /// with the name, whatever its state:
    /// - still active: the new roots start Blocked
    /// - succeeded: the dependency is already met
    /// - failed or cancelled: the new work is created Cancelled
    ///   (AppendOrReplace starts a fresh chain instead)
    pub async fn submit_unique_graph(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        graph: WorkGraph,
    ) -> Result<UniqueSubmission, SchedulerError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyUniqueName.into());
        }
        self.validate_graph(&graph)?;
        let appending = matches!(
            policy,
            ExistingWorkPolicy::Append | ExistingWorkPolicy::AppendOrReplace
        );
        if appending && graph.specs().any(|s| s.schedule.is_periodic()) {
            return Err(ValidationError::PeriodicInGraph.into());
        }

        let _name_guard = self.inner.locks.lock(LockKey::Name(name.to_string())).await;
        let existing = self.inner.store.load_by_unique_name(name).await?;
        let active: Vec<TaskId> = existing
            .iter()
            .filter(|r| r.state.is_active())
            .map(|r| r.id)
            .collect();

        let submission = match policy {
            ExistingWorkPolicy::Keep if !active.is_empty() => UniqueSubmission {
                ids: active,
                resolution: DedupResolution::KeptExisting,
            },
            ExistingWorkPolicy::Keep => created(self.insert_fresh(graph, Some(name)).await?),
            ExistingWorkPolicy::Replace => {
                let mut cancelled = Vec::new();
                for id in active {
                    if let Some(r) = self.inner.store.load(id).await? {
                        cancelled.extend(self.cancel_in_graph(r.graph_id, id).await?);
                    }
                }
                let ids = self.insert_fresh(graph, Some(name)).await?;
                if cancelled.is_empty() {
                    created(ids)
                } else {
                    UniqueSubmission {
                        ids,
                        resolution: DedupResolution::Replaced { cancelled },
                    }
                }
            }
            ExistingWorkPolicy::Append | ExistingWorkPolicy::AppendOrReplace => {
                match existing.iter().max_by_key(|r| r.seq) {
                    None => created(self.insert_fresh(graph, Some(name)).await?),
                    Some(pred) => {
                        self.append_after(pred.id, pred.graph_id, policy, graph, name)
                            .await?
                    }
                }
            }
        };

        info!(
            unique_name = name,
            ?policy,
            resolution = ?submission.resolution,
            ids = ?submission.ids,
            "unique work resolved"
        );
        Ok(submission)
    }

    fn validate_spec(&self, spec: &TaskSpec) -> Result<(), ValidationError> {
        spec.validate(self.inner.config.max_data_bytes)?;
        if !self.inner.executor.supports(&spec.work_type) {
            return Err(ValidationError::UnknownWorkType(spec.work_type.clone()));
        }
        Ok(())
    }

    fn validate_graph(&self, graph: &WorkGraph) -> Result<(), ValidationError> {
        if graph.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        for spec in graph.specs() {
            self.validate_spec(spec)?;
        }
        if graph.len() > 1 && graph.specs().any(|s| s.schedule.is_periodic()) {
            return Err(ValidationError::PeriodicInGraph);
        }
        Ok(())
    }

    async fn insert_fresh(
        &self,
        graph: WorkGraph,
        name: Option<&str>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        let records = self.build_records(graph, name, None);
        let Some(first) = records.first() else {
            return Err(ValidationError::EmptyBatch.into());
        };
        let _graph_guard = self.lock_graph(first.graph_id).await;
        self.persist_new(records, None).await
    }

    async fn append_after(
        &self,
        pred_id: TaskId,
        graph_id: TaskId,
        policy: ExistingWorkPolicy,
        graph: WorkGraph,
        name: &str,
    ) -> Result<UniqueSubmission, SchedulerError> {
        let graph_guard = self.lock_graph(graph_id).await;
        let Some(pred) = self.inner.store.load(pred_id).await? else {
            // pruned in the meantime
            drop(graph_guard);
            return Ok(created(self.insert_fresh(graph, Some(name)).await?));
        };
        if pred.is_periodic() {
            return Err(ValidationError::PeriodicInGraph.into());
        }

        let unsuccessful = matches!(pred.state, TaskState::Failed | TaskState::Cancelled);
        if policy == ExistingWorkPolicy::AppendOrReplace && unsuccessful {
            drop(graph_guard);
            let ids = self.insert_fresh(graph, Some(name)).await?;
            return Ok(UniqueSubmission {
                ids,
                resolution: DedupResolution::ReplacedFailed {
                    predecessor: pred_id,
                },
            });
        }

        let records = self.build_records(graph, Some(name), Some(&pred));
        let ids = self.persist_new(records, Some(pred)).await?;
        Ok(UniqueSubmission {
            ids,
            resolution: DedupResolution::Appended { after: pred_id },
        })
    }

    /// Turn a validated graph into records with ids, edges, clamped
    /// schedules and initial states. Nothing is persisted here.
    fn build_records(
        &self,
        graph: WorkGraph,
        name: Option<&str>,
        after: Option<&TaskRecord>,
    ) -> Vec<TaskRecord> {
        let nodes = graph.into_nodes();
        let ids: Vec<TaskId> = nodes
            .iter()
            .map(|_| self.inner.ids.generate_task_id())
            .collect();
        let Some(&first) = ids.first() else {
            return Vec::new();
        };
        let graph_id = after.map_or(first, |p| p.graph_id);
        let now = self.now();
        let floors = self.inner.config.periodic_floors();
        let default_backoff = self.inner.config.default_backoff();

        let mut records: Vec<TaskRecord> = Vec::with_capacity(nodes.len());
        for (id, node) in ids.iter().copied().zip(nodes) {
            let GraphNode {
                mut spec,
                depends_on,
            } = node;
            let (schedule, warnings) = spec.schedule.clamped(floors);
            for w in &warnings {
                warn!(task_id = %id, "{w}");
            }
            spec.schedule = schedule;

            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
            let mut r = TaskRecord::new(id, graph_id, seq, spec, default_backoff, now);
            r.unique_name = name.map(str::to_string);
            r.warnings = warnings;
            r.depends_on = depends_on
                .iter()
                .filter_map(|n| ids.get(n.index()).copied())
                .collect();
            if let Some(p) = after
                && r.depends_on.is_empty()
            {
                r.depends_on.push(p.id);
            }
            records.push(r);
        }

        // reverse edges inside the batch
        let edges: Vec<(TaskId, TaskId)> = records
            .iter()
            .flat_map(|r| r.depends_on.iter().map(move |d| (*d, r.id)))
            .collect();
        for (prerequisite, dependent) in edges {
            if let Some(p) = records.iter_mut().find(|r| r.id == prerequisite) {
                p.dependents.push(dependent);
            }
        }

        let pred_state = after.map(|p| (p.id, p.state));
        for r in &mut records {
            let waits_in_batch = r.depends_on.iter().any(|d| ids.contains(d));
            r.state = match pred_state {
                Some((pred, TaskState::Failed | TaskState::Cancelled)) => {
                    r.warnings
                        .push(format!("predecessor {pred} did not succeed; appended work cancelled"));
                    TaskState::Cancelled
                }
                _ if waits_in_batch => TaskState::Blocked,
                Some((_, state)) if state.is_active() && !r.depends_on.is_empty() => {
                    TaskState::Blocked
                }
                _ => TaskState::Enqueued,
            };
            if r.state == TaskState::Enqueued {
                let delay = r.initial_delay + r.schedule.first_window_delay();
                r.next_run_at = self.wall_deadline(delay);
            }
        }
        records
    }

    /// Caller holds the graph lock of the batch. All or nothing: when a
    /// write fails, the records already written are deleted again.
    async fn persist_new(
        &self,
        records: Vec<TaskRecord>,
        predecessor: Option<TaskRecord>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        let mut written = Vec::with_capacity(records.len());
        for r in &records {
            if let Err(e) = self.inner.store.save(r).await {
                self.roll_back(&written).await;
                return Err(e);
            }
            written.push(r.id);
        }

        if let Some(mut pred) = predecessor {
            let roots: Vec<TaskId> = records
                .iter()
                .filter(|r| r.depends_on.contains(&pred.id))
                .map(|r| r.id)
                .collect();
            pred.dependents.extend(roots);
            // a pruned predecessor stays pruned; its dependents treat it as met
            match self.inner.store.compare_and_set(pred.state, &pred).await {
                Ok(true) => {}
                Ok(false) => debug!(task_id = %pred.id, "predecessor gone; not linked"),
                Err(e) => {
                    self.roll_back(&written).await;
                    return Err(e);
                }
            }
        }

        for r in &records {
            self.publish(r);
            info!(
                task_id = %r.id,
                work_type = %r.work_type,
                state = %r.state,
                depends_on = r.depends_on.len(),
                "task submitted"
            );
            if r.state == TaskState::Enqueued {
                self.arm(r, self.remaining(r));
            }
        }
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Undo a partially persisted batch. Nothing was published yet.
    async fn roll_back(&self, written: &[TaskId]) {
        for &id in written {
            if let Err(e) = self.inner.store.delete(id).await {
                error!(task_id = %id, error = %e, "could not roll back partial submission");
            }
        }
        if !written.is_empty() {
            warn!(rolled_back = written.len(), "submission failed; partial batch removed");
        }
    }

    // ------------------------------------------------------------------
    // cancellation
    // ------------------------------------------------------------------

    /// Cancel one task and its dependents. Returns whether `id` itself
    /// transitioned (false when it was already terminal).
    pub async fn cancel(&self, id: TaskId) -> Result<bool, SchedulerError> {
        let Some(r) = self.inner.store.load(id).await? else {
            return Err(SchedulerError::NotFound(id));
        };
        let cancelled = self.cancel_in_graph(r.graph_id, id).await?;
        Ok(cancelled.contains(&id))
    }

    /// Cancel every active task with `tag`, plus dependents. Returns every
    /// id that transitioned.
    pub async fn cancel_by_tag(&self, tag: &str) -> Result<Vec<TaskId>, SchedulerError> {
        let records = self.inner.store.load_by_tag(tag).await?;
        let mut cancelled = Vec::new();
        for r in records.into_iter().filter(|r| r.state.is_active()) {
            cancelled.extend(self.cancel_in_graph(r.graph_id, r.id).await?);
        }
        info!(tag, cancelled = cancelled.len(), "cancelled by tag");
        Ok(cancelled)
    }

    pub async fn cancel_unique(&self, name: &str) -> Result<Vec<TaskId>, SchedulerError> {
        let _name_guard = self.inner.locks.lock(LockKey::Name(name.to_string())).await;
        let records = self.inner.store.load_by_unique_name(name).await?;
        let mut cancelled = Vec::new();
        for r in records.into_iter().filter(|r| r.state.is_active()) {
            cancelled.extend(self.cancel_in_graph(r.graph_id, r.id).await?);
        }
        info!(unique_name = name, cancelled = cancelled.len(), "cancelled by unique name");
        Ok(cancelled)
    }

    async fn cancel_in_graph(
        &self,
        graph_id: TaskId,
        id: TaskId,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        let _graph_guard = self.lock_graph(graph_id).await;
        self.cascade_cancel(vec![id], false, None).await
    }

    /// Cancel `start` and everything downstream of it. With `siblings`, the
    /// other direct prerequisites of the cancelled dependents go too (a
    /// failed fan-in branch takes the remaining branches with it), without
    /// climbing further up.
    ///
    /// Caller holds the graph lock.
    async fn cascade_cancel(
        &self,
        start: Vec<TaskId>,
        siblings: bool,
        reason: Option<String>,
    ) -> Result<Vec<TaskId>, SchedulerError> {
        // (id, take its other prerequisites along)
        let mut work: Vec<(TaskId, bool)> = start.into_iter().map(|id| (id, siblings)).collect();
        let mut seen = HashSet::new();
        let mut cancelled = Vec::new();

        while let Some((id, climb)) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(mut r) = self.inner.store.load(id).await? else {
                continue;
            };
            if r.state.is_terminal() {
                // an earlier cascade may have stopped halfway
                if r.state == TaskState::Cancelled {
                    work.extend(r.dependents.iter().map(|d| (*d, false)));
                }
                continue;
            }
            let from = r.state;
            if !self.transition(&mut r, TaskState::Cancelled) {
                continue;
            }
            if let Some(reason) = &reason {
                r.warnings.push(reason.clone());
            }
            if !self.commit(from, &r).await? {
                continue;
            }
            self.inner.queue.disarm(id);
            if from == TaskState::Running {
                self.signal_cancel(id);
            }
            info!(task_id = %id, from = %from, "task cancelled");

            work.extend(r.dependents.iter().map(|d| (*d, false)));
            if climb {
                work.extend(r.depends_on.iter().map(|p| (*p, false)));
            }
            cancelled.push(id);
        }
        Ok(cancelled)
    }

    // ------------------------------------------------------------------
    // dispatch
    // ------------------------------------------------------------------

    /// Start every task that is due and admissible. Returns how many runs
    /// were started. Tasks whose dispatch hit a store error are re-armed.
    pub async fn dispatch_ready(&self) -> Result<usize, SchedulerError> {
        let mut started = 0;
        let mut failed = Vec::new();
        let mut first_err = None;

        while let Some(id) = self.inner.queue.pop_ready(Instant::now()) {
            match self.try_start(id).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(task_id = %id, error = %e, "dispatch failed");
                    failed.push(id);
                    first_err.get_or_insert(e);
                }
            }
        }

        let retry_in = self
            .inner
            .config
            .store_retry
            .base_delay()
            .max(Duration::from_millis(100));
        for id in failed {
            self.inner.queue.arm(id, instant_after(retry_in), false);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(started),
        }
    }

    async fn try_start(&self, id: TaskId) -> Result<bool, SchedulerError> {
        let Some(r) = self.inner.store.load(id).await? else {
            return Ok(false);
        };
        let _graph_guard = self.lock_graph(r.graph_id).await;
        let Some(mut r) = self.inner.store.load(id).await? else {
            return Ok(false);
        };
        if r.state != TaskState::Enqueued {
            debug!(task_id = %id, state = %r.state, "stale ready entry skipped");
            return Ok(false);
        }

        let env = self.environment();
        if !is_satisfied(&r.constraints, &env) {
            debug!(task_id = %id, constraints = ?r.constraints, "constraints not met; gated");
            self.inner.queue.gate(id);
            return Ok(false);
        }

        let (cancel, expedited) = match self.admit(&r) {
            Admission::Run { cancel, expedited } => (cancel, expedited),
            Admission::Drop => {
                warn!(task_id = %id, "expedited quota exhausted; work request dropped");
                self.cascade_cancel(
                    vec![id],
                    false,
                    Some("expedited quota exhausted; work request dropped".to_string()),
                )
                .await?;
                return Ok(false);
            }
        };

        if !self.transition(&mut r, TaskState::Running) {
            self.release_run(id);
            return Ok(false);
        }
        match self.commit(TaskState::Enqueued, &r).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_run(id);
                return Ok(false);
            }
            Err(e) => {
                self.release_run(id);
                return Err(e);
            }
        }
        debug!(
            task_id = %id,
            work_type = %r.work_type,
            attempt = r.attempt_count,
            expedited,
            "task started"
        );
        self.spawn_run(&r, cancel);
        Ok(true)
    }

    fn admit(&self, r: &TaskRecord) -> Admission {
        let mut running = self.running();
        let in_use = running.values().filter(|e| e.expedited).count();
        let expedited = match r.expedited {
            None => false,
            Some(_) if in_use < self.inner.config.expedited_quota => true,
            Some(OutOfQuotaPolicy::RunAsNonExpedited) => {
                debug!(task_id = %r.id, "expedited quota exhausted; running as ordinary work");
                false
            }
            Some(OutOfQuotaPolicy::DropWorkRequest) => return Admission::Drop,
        };
        let (tx, rx) = watch::channel(false);
        running.insert(
            r.id,
            RunEntry {
                cancel: tx,
                expedited,
            },
        );
        Admission::Run {
            cancel: rx,
            expedited,
        }
    }

    fn spawn_run(&self, r: &TaskRecord, cancel: watch::Receiver<bool>) {
        let id = r.id;
        let item = WorkItem {
            id,
            work_type: r.work_type.clone(),
            input: r.input.clone(),
            attempt: r.attempt_count,
        };
        let ctx = WorkContext::new(
            id,
            cancel,
            Arc::new(self.clone()),
            self.inner.config.max_data_bytes,
        );
        let executor = Arc::clone(&self.inner.executor);
        let scheduler = self.clone();

        tokio::spawn(async move {
            let run = tokio::spawn(async move { executor.execute(item, ctx).await });
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(task_id = %id, error = %e, "executor panicked");
                    Outcome::failure_reason(format!("executor panicked: {e}"))
                }
            };
            scheduler.deliver_outcome(id, outcome).await;
        });
    }

    /// Feed a run result back, retrying while the store is unavailable so
    /// the transition is never dropped.
    async fn deliver_outcome(&self, id: TaskId, outcome: Outcome) {
        let mut delay = self.inner.config.store_retry.base_delay().max(Duration::from_millis(100));
        loop {
            match self.on_task_finished(id, outcome.clone()).await {
                Ok(()) => return,
                Err(SchedulerError::Store { .. }) => {
                    warn!(task_id = %id, ?delay, "could not record outcome; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.inner.config.max_backoff());
                }
                Err(e) => {
                    error!(task_id = %id, error = %e, "outcome dropped");
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // completion
    // ------------------------------------------------------------------

    /// Execution result for a running task.
    ///
    /// A result for a task that already finished re-runs the follow-up on
    /// its dependents, so a delivery that failed halfway can be repeated.
    /// Results for tasks back in Enqueued or Blocked are ignored.
    pub async fn on_task_finished(
        &self,
        id: TaskId,
        outcome: Outcome,
    ) -> Result<(), SchedulerError> {
        let Some(r) = self.inner.store.load(id).await? else {
            self.release_run(id);
            return Err(SchedulerError::NotFound(id));
        };
        let _graph_guard = self.lock_graph(r.graph_id).await;
        self.release_run(id);
        let Some(r) = self.inner.store.load(id).await? else {
            return Err(SchedulerError::NotFound(id));
        };
        if r.state.is_terminal() {
            debug!(task_id = %id, state = %r.state, kind = ?outcome.kind(), "task already finished; settling dependents");
            return self.settle_dependents(&r).await;
        }
        if r.state != TaskState::Running {
            debug!(task_id = %id, state = %r.state, kind = ?outcome.kind(), "late completion ignored");
            return Ok(());
        }

        let outcome = self.cap_output(id, outcome);
        let decision = self.inner.decider.decide(&r, &outcome);
        self.apply(r, decision).await
    }

    fn cap_output(&self, id: TaskId, outcome: Outcome) -> Outcome {
        let limit = self.inner.config.max_data_bytes;
        match &outcome {
            Outcome::Success(data) | Outcome::Failure(data) => match data.check(limit) {
                Ok(()) => outcome,
                Err(e) => {
                    warn!(task_id = %id, error = %e, "output rejected");
                    Outcome::failure_reason(format!("output rejected: {e}"))
                }
            },
            Outcome::Retry => outcome,
        }
    }

    /// Caller holds the graph lock; `r` is Running.
    async fn apply(&self, mut r: TaskRecord, decision: Decision) -> Result<(), SchedulerError> {
        let id = r.id;
        match decision {
            Decision::Complete { output } => {
                if !self.transition(&mut r, TaskState::Succeeded) {
                    return Ok(());
                }
                r.output = Some(output);
                if self.commit(TaskState::Running, &r).await? {
                    info!(task_id = %id, "task succeeded");
                    self.settle_dependents(&r).await?;
                }
            }
            Decision::Fail { output } => {
                if !self.transition(&mut r, TaskState::Failed) {
                    return Ok(());
                }
                r.output = Some(output);
                if self.commit(TaskState::Running, &r).await? {
                    warn!(task_id = %id, attempt = r.attempt_count, "task failed");
                    self.settle_dependents(&r).await?;
                }
            }
            Decision::Retry { delay, attempt } => {
                if !self.transition(&mut r, TaskState::Enqueued) {
                    return Ok(());
                }
                r.attempt_count = attempt;
                r.next_run_at = self.wall_deadline(delay);
                if self.commit(TaskState::Running, &r).await? {
                    info!(task_id = %id, attempt, ?delay, "retry scheduled");
                    self.arm(&r, delay);
                }
            }
            Decision::Reschedule { delay, output } => {
                if !self.transition(&mut r, TaskState::Enqueued) {
                    return Ok(());
                }
                r.output = Some(output);
                r.attempt_count = 0;
                r.next_run_at = self.wall_deadline(delay);
                if self.commit(TaskState::Running, &r).await? {
                    info!(task_id = %id, ?delay, "periodic run finished; next window scheduled");
                    self.arm(&r, delay);
                }
            }
        }
        Ok(())
    }

    /// Downstream effect of a terminal task: release dependents after a
    /// success, cancel them otherwise. Repeatable; dependents already moved
    /// on are skipped. Caller holds the graph lock.
    async fn settle_dependents(&self, r: &TaskRecord) -> Result<(), SchedulerError> {
        let id = r.id;
        match r.state {
            TaskState::Succeeded => self.release_dependents(r).await,
            TaskState::Failed => {
                let reason = format!("prerequisite {id} failed");
                self.cascade_cancel(r.dependents.clone(), true, Some(reason))
                    .await
                    .map(drop)
            }
            TaskState::Cancelled => self
                .cascade_cancel(r.dependents.clone(), false, None)
                .await
                .map(drop),
            _ => Ok(()),
        }
    }

    /// `done` just succeeded: move dependents whose prerequisites all
    /// succeeded from Blocked to Enqueued. Caller holds the graph lock.
    async fn release_dependents(&self, done: &TaskRecord) -> Result<(), SchedulerError> {
        for &dep_id in &done.dependents {
            let Some(dep) = self.inner.store.load(dep_id).await? else {
                continue;
            };
            if dep.state != TaskState::Blocked {
                continue;
            }
            match self.readiness(&dep).await? {
                Readiness::Ready => self.unblock(dep).await?,
                Readiness::Waiting => {
                    debug!(task_id = %dep_id, "dependent still waiting");
                }
                Readiness::Doomed(p) => {
                    let reason = format!("prerequisite {p} did not succeed");
                    self.cascade_cancel(vec![dep_id], false, Some(reason)).await?;
                }
            }
        }
        Ok(())
    }

    /// Order-independent: every prerequisite is checked on each call.
    async fn readiness(&self, r: &TaskRecord) -> Result<Readiness, SchedulerError> {
        let mut waiting = false;
        for &p in &r.depends_on {
            match self.inner.store.load(p).await?.map(|p| p.state) {
                // pruned prerequisites had succeeded, or their failure
                // already cascaded
                None | Some(TaskState::Succeeded) => {}
                Some(TaskState::Failed | TaskState::Cancelled) => return Ok(Readiness::Doomed(p)),
                Some(_) => waiting = true,
            }
        }
        Ok(if waiting {
            Readiness::Waiting
        } else {
            Readiness::Ready
        })
    }

    async fn unblock(&self, mut r: TaskRecord) -> Result<(), SchedulerError> {
        if !self.transition(&mut r, TaskState::Enqueued) {
            return Ok(());
        }
        r.next_run_at = self.wall_deadline(r.initial_delay);
        if self.commit(TaskState::Blocked, &r).await? {
            debug!(task_id = %r.id, "dependencies met");
            self.arm(&r, r.initial_delay);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // progress, environment, maintenance
    // ------------------------------------------------------------------

    /// Attach progress to a running task. Ignored for tasks not Running.
    pub async fn report_progress(&self, id: TaskId, progress: Data) -> Result<(), SchedulerError> {
        progress.check(self.inner.config.max_data_bytes)?;
        let Some(r) = self.inner.store.load(id).await? else {
            return Ok(());
        };
        let _graph_guard = self.lock_graph(r.graph_id).await;
        let Some(mut r) = self.inner.store.load(id).await? else {
            return Ok(());
        };
        if r.state != TaskState::Running {
            return Ok(());
        }
        r.progress = Some(progress);
        r.touch(self.now());
        self.commit(TaskState::Running, &r).await?;
        Ok(())
    }

    pub fn environment(&self) -> Environment {
        *self
            .inner
            .environment
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the environment snapshot and re-check gated tasks.
    pub fn update_environment(&self, env: Environment) {
        *self
            .inner
            .environment
            .write()
            .unwrap_or_else(|e| e.into_inner()) = env;
        let released = self.inner.queue.release_gated();
        debug!(?env, released, "environment updated");
    }

    /// Delete terminal records. Active records are never touched.
    pub async fn prune(&self) -> Result<Vec<TaskId>, SchedulerError> {
        let removed = self.inner.store.delete_terminal().await?;
        self.inner.hub.publish_removed(&removed);
        let idle_locks = self.inner.locks.purge_idle();
        info!(removed = removed.len(), idle_locks, "pruned terminal records");
        Ok(removed)
    }

    /// Rebuild in-memory scheduling state from the store after a restart.
    pub async fn recover(&self) -> Result<RecoveryReport, SchedulerError> {
        let all = self.inner.store.load_all().await?;
        if let Some(max) = all.iter().map(|r| r.seq).max() {
            self.inner.seq.fetch_max(max + 1, Ordering::SeqCst);
        }

        let mut report = RecoveryReport::default();
        for stale in self.inner.store.load_active().await? {
            let _graph_guard = self.lock_graph(stale.graph_id).await;
            let Some(mut r) = self.inner.store.load(stale.id).await? else {
                continue;
            };
            match r.state {
                TaskState::Running if !self.is_running(r.id) => {
                    if self.transition(&mut r, TaskState::Enqueued)
                        && self.commit(TaskState::Running, &r).await?
                    {
                        self.arm(&r, Duration::ZERO);
                        report.requeued += 1;
                    }
                }
                TaskState::Enqueued => {
                    self.arm(&r, self.remaining(&r));
                    report.rearmed += 1;
                }
                TaskState::Blocked => match self.readiness(&r).await? {
                    Readiness::Ready => {
                        self.unblock(r).await?;
                        report.released += 1;
                    }
                    Readiness::Waiting => report.blocked += 1,
                    Readiness::Doomed(p) => {
                        let reason = format!("prerequisite {p} did not succeed");
                        report.cancelled += self
                            .cascade_cancel(vec![r.id], false, Some(reason))
                            .await?
                            .len();
                    }
                },
                _ => {}
            }
        }
        info!(?report, "recovered from store");
        Ok(report)
    }

    /// Spawn the dispatch loop.
    pub fn start(&self) -> Dispatcher {
        Dispatcher::spawn(self.clone())
    }

    // ------------------------------------------------------------------
    // queries & observation
    // ------------------------------------------------------------------

    pub async fn get(&self, id: TaskId) -> Result<Option<TaskSnapshot>, SchedulerError> {
        Ok(self.inner.store.load(id).await?.map(|r| r.snapshot()))
    }

    pub async fn counts(&self) -> Result<StateCounts, SchedulerError> {
        let all = self.inner.store.load_all().await?;
        Ok(StateCounts::from_records(&all))
    }

    /// Live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.inner.hub.subscriber_count()
    }

    pub async fn observe_by_id(
        &self,
        id: TaskId,
    ) -> Result<Subscription<Option<TaskSnapshot>>, SchedulerError> {
        let sid = self.inner.ids.generate_subscription_id();
        let sub = self.inner.hub.register_single(sid, id);
        let loaded = self.inner.store.load(id).await?;
        self.inner
            .hub
            .seed(sid, loaded.iter().map(TaskRecord::snapshot).collect());
        Ok(sub)
    }

    pub async fn observe_by_tag(
        &self,
        tag: &str,
    ) -> Result<Subscription<Vec<TaskSnapshot>>, SchedulerError> {
        let sid = self.inner.ids.generate_subscription_id();
        let sub = self
            .inner
            .hub
            .register_list(sid, Filter::Tag(tag.to_string()));
        let loaded = self.inner.store.load_by_tag(tag).await?;
        self.inner
            .hub
            .seed(sid, loaded.iter().map(TaskRecord::snapshot).collect());
        Ok(sub)
    }

    pub async fn observe_by_unique_name(
        &self,
        name: &str,
    ) -> Result<Subscription<Vec<TaskSnapshot>>, SchedulerError> {
        let sid = self.inner.ids.generate_subscription_id();
        let sub = self
            .inner
            .hub
            .register_list(sid, Filter::Name(name.to_string()));
        let loaded = self.inner.store.load_by_unique_name(name).await?;
        self.inner
            .hub
            .seed(sid, loaded.iter().map(TaskRecord::snapshot).collect());
        Ok(sub)
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    pub(crate) fn ready_queue(&self) -> &ReadyQueue {
        &self.inner.queue
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    async fn lock_graph(&self, graph_id: TaskId) -> OwnedMutexGuard<()> {
        self.inner.locks.lock(LockKey::Graph(graph_id)).await
    }

    fn running(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, RunEntry>> {
        self.inner.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_running(&self, id: TaskId) -> bool {
        self.running().contains_key(&id)
    }

    fn release_run(&self, id: TaskId) {
        self.running().remove(&id);
    }

    fn signal_cancel(&self, id: TaskId) {
        if let Some(entry) = self.running().get(&id) {
            entry.cancel.send_replace(true);
        }
    }

    fn transition(&self, r: &mut TaskRecord, to: TaskState) -> bool {
        let from = r.state;
        match r.transition(to, self.now()) {
            Ok(()) => {
                debug!(task_id = %r.id, %from, %to, "transition");
                true
            }
            Err(e) => {
                error!(error = %e, "illegal transition skipped");
                false
            }
        }
    }

    /// Persist `r` if the stored state is still `from`, then publish.
    async fn commit(&self, from: TaskState, r: &TaskRecord) -> Result<bool, SchedulerError> {
        if self.inner.store.compare_and_set(from, r).await? {
            self.publish(r);
            Ok(true)
        } else {
            warn!(task_id = %r.id, expected = %from, "stored state moved on; change dropped");
            Ok(false)
        }
    }

    fn publish(&self, r: &TaskRecord) {
        self.inner.hub.publish(&r.snapshot());
    }

    fn arm(&self, r: &TaskRecord, delay: Duration) {
        self.inner
            .queue
            .arm(r.id, instant_after(delay), r.expedited.is_some());
    }

    /// Time left until `next_run_at`.
    fn remaining(&self, r: &TaskRecord) -> Duration {
        r.next_run_at
            .and_then(|at| (at - self.now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    fn wall_deadline(&self, delay: Duration) -> Option<DateTime<Utc>> {
        if delay.is_zero() {
            return None;
        }
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| self.now().checked_add_signed(d))
    }
}

#[async_trait]
impl ProgressSink for Scheduler {
    async fn report_progress(&self, id: TaskId, progress: Data) {
        if let Err(e) = Scheduler::report_progress(self, id, progress).await {
            warn!(task_id = %id, error = %e, "progress update dropped");
        }
    }
}

fn created(ids: Vec<TaskId>) -> UniqueSubmission {
    UniqueSubmission {
        ids,
        resolution: DedupResolution::Created,
    }
}

fn instant_after(delay: Duration) -> Instant {
    Instant::now() + delay.min(MAX_TIMER)
}
