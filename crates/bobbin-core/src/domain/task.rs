//! Task spec (what the client submits) and task record (what the store keeps).

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backoff::{Backoff, duration_millis};
use super::constraints::Constraints;
use super::data::Data;
use super::errors::{TransitionError, ValidationError};
use super::events::TaskSnapshot;
use super::ids::TaskId;
use super::schedule::Schedule;
use super::state::TaskState;

/// Identifier of the routine that performs a task, resolved by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkType(String);

impl WorkType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What happens to expedited work when the expedited quota is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfQuotaPolicy {
    RunAsNonExpedited,
    DropWorkRequest,
}

/// A unit of deferred work as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub work_type: WorkType,

    #[serde(default)]
    pub input: Data,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub constraints: Constraints,

    /// `None` uses the scheduler's configured default.
    #[serde(default)]
    pub backoff: Option<Backoff>,

    #[serde(default, with = "duration_millis")]
    pub initial_delay: Duration,

    #[serde(default)]
    pub schedule: Schedule,

    /// Upper bound on runs. `None`: retry forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(default)]
    pub expedited: Option<OutOfQuotaPolicy>,
}

impl TaskSpec {
    pub fn new(work_type: impl Into<WorkType>) -> Self {
        Self {
            work_type: work_type.into(),
            input: Data::empty(),
            tags: BTreeSet::new(),
            constraints: Constraints::none(),
            backoff: None,
            initial_delay: Duration::ZERO,
            schedule: Schedule::OneTime,
            max_attempts: None,
            expedited: None,
        }
    }

    pub fn with_input(mut self, input: Data) -> Self {
        self.input = input;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn expedited(mut self, policy: OutOfQuotaPolicy) -> Self {
        self.expedited = Some(policy);
        self
    }

    /// Checks that do not depend on the scheduler's wiring.
    pub fn validate(&self, max_data_bytes: usize) -> Result<(), ValidationError> {
        if self.work_type.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyWorkType);
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTag);
        }
        if let Schedule::Periodic { interval, flex } = self.schedule {
            if interval.is_zero() {
                return Err(ValidationError::NonPositiveInterval);
            }
            if flex.is_some_and(|f| f.is_zero()) {
                return Err(ValidationError::NonPositiveFlex);
            }
        }
        if self.max_attempts == Some(0) {
            return Err(ValidationError::ZeroMaxAttempts);
        }
        if self.expedited.is_some() {
            if !self.initial_delay.is_zero() {
                return Err(ValidationError::ExpeditedWithDelay);
            }
            if self.schedule.is_periodic() {
                return Err(ValidationError::ExpeditedPeriodic);
            }
            if !self.constraints.allowed_for_expedited() {
                return Err(ValidationError::ExpeditedConstraints);
            }
        }
        self.input.check(max_data_bytes)?;
        Ok(())
    }
}

/// Persisted state of a task.
///
/// This is the single source of truth: dependency edges live here (not in
/// a side graph) so a store reload restores the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    /// DAG group. All tasks linked by edges share it; state changes inside a
    /// group are serialized on it.
    pub graph_id: TaskId,

    /// Creation order within the scheduler.
    pub seq: u64,

    pub work_type: WorkType,
    pub input: Data,
    pub tags: BTreeSet<String>,
    pub unique_name: Option<String>,
    pub constraints: Constraints,
    pub backoff: Backoff,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    pub schedule: Schedule,
    pub max_attempts: Option<u32>,
    pub expedited: Option<OutOfQuotaPolicy>,

    pub state: TaskState,
    pub output: Option<Data>,
    pub progress: Option<Data>,

    /// Incremented on each retry request.
    pub attempt_count: u32,

    pub depends_on: Vec<TaskId>,
    pub dependents: Vec<TaskId>,

    /// Wall-clock time the task becomes eligible (informational, and used to
    /// re-arm timers after a restart).
    pub next_run_at: Option<DateTime<Utc>>,

    pub warnings: Vec<String>,

    /// Bumped on every persisted change; observers use it to drop stale
    /// snapshots.
    pub revision: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Build a fresh record from a validated spec. State starts Enqueued.
    pub fn new(
        id: TaskId,
        graph_id: TaskId,
        seq: u64,
        spec: TaskSpec,
        default_backoff: Backoff,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            graph_id,
            seq,
            work_type: spec.work_type,
            input: spec.input,
            tags: spec.tags,
            unique_name: None,
            constraints: spec.constraints,
            backoff: spec.backoff.unwrap_or(default_backoff),
            initial_delay: spec.initial_delay,
            schedule: spec.schedule,
            max_attempts: spec.max_attempts,
            expedited: spec.expedited,
            state: TaskState::Enqueued,
            output: None,
            progress: None,
            attempt_count: 0,
            depends_on: Vec::new(),
            dependents: Vec::new(),
            next_run_at: None,
            warnings: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_periodic(&self) -> bool {
        self.schedule.is_periodic()
    }

    /// Apply a state transition, rejecting moves the state machine forbids.
    pub fn transition(&mut self, to: TaskState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                task_id: self.id,
                from: self.state,
                to,
            });
        }
        if self.state == TaskState::Running {
            self.progress = None;
        }
        self.state = to;
        if to != TaskState::Enqueued {
            self.next_run_at = None;
        }
        self.touch(now);
        Ok(())
    }

    /// Mark a field change that is not a state transition.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraints::NetworkRequirement;
    use crate::domain::data::MAX_DATA_BYTES;
    use crate::domain::task::OutOfQuotaPolicy;

    fn record(spec: TaskSpec) -> TaskRecord {
        let id = TaskId::from_u128(1);
        TaskRecord::new(id, id, 1, spec, Backoff::default(), Utc::now())
    }

    #[test]
    fn empty_work_type_is_rejected() {
        let err = TaskSpec::new("  ").validate(MAX_DATA_BYTES).unwrap_err();
        assert_eq!(err, ValidationError::EmptyWorkType);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let spec = TaskSpec::new("sync").with_schedule(Schedule::periodic(Duration::ZERO));
        assert_eq!(
            spec.validate(MAX_DATA_BYTES).unwrap_err(),
            ValidationError::NonPositiveInterval
        );
    }

    #[test]
    fn expedited_rules() {
        let delayed = TaskSpec::new("upload")
            .expedited(OutOfQuotaPolicy::RunAsNonExpedited)
            .with_initial_delay(Duration::from_secs(1));
        assert_eq!(
            delayed.validate(MAX_DATA_BYTES).unwrap_err(),
            ValidationError::ExpeditedWithDelay
        );

        let charging = TaskSpec::new("upload")
            .expedited(OutOfQuotaPolicy::RunAsNonExpedited)
            .with_constraints(Constraints::none().with_charging());
        assert_eq!(
            charging.validate(MAX_DATA_BYTES).unwrap_err(),
            ValidationError::ExpeditedConstraints
        );

        let ok = TaskSpec::new("upload")
            .expedited(OutOfQuotaPolicy::DropWorkRequest)
            .with_constraints(Constraints::none().with_network(NetworkRequirement::Connected));
        assert!(ok.validate(MAX_DATA_BYTES).is_ok());
    }

    #[test]
    fn oversized_input_is_a_validation_error() {
        let input = Data::builder().put("k", "v".repeat(64)).build().unwrap();
        let err = TaskSpec::new("x").with_input(input).validate(16).unwrap_err();
        assert!(matches!(err, ValidationError::Data(_)));
    }

    #[test]
    fn new_record_uses_default_backoff_when_unset() {
        let r = record(TaskSpec::new("x"));
        assert_eq!(r.backoff, Backoff::default());
        assert_eq!(r.state, TaskState::Enqueued);
        assert_eq!(r.attempt_count, 0);
    }

    #[test]
    fn transition_bumps_revision_and_clears_progress() {
        let mut r = record(TaskSpec::new("x"));
        r.transition(TaskState::Running, Utc::now()).unwrap();
        r.progress = Some(Data::builder().put("pct", 50i64).build().unwrap());
        let rev = r.revision;

        r.transition(TaskState::Succeeded, Utc::now()).unwrap();
        assert_eq!(r.revision, rev + 1);
        assert!(r.progress.is_none());
    }

    #[test]
    fn transition_out_of_terminal_is_an_error() {
        let mut r = record(TaskSpec::new("x"));
        r.transition(TaskState::Cancelled, Utc::now()).unwrap();

        let err = r.transition(TaskState::Enqueued, Utc::now()).unwrap_err();
        assert_eq!(err.from, TaskState::Cancelled);
        assert_eq!(r.state, TaskState::Cancelled);
    }
}
