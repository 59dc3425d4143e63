//! Error taxonomy.
//!
//! - `ValidationError`: malformed submission, rejected before any record exists.
//! - `GraphError`: cyclic or inconsistent DAG, rejected at build time.
//! - `StoreError`: persistence trouble; transient kinds are retried.
//!
//! Execution failures are not errors here: they are task state (`Failed`)
//! and only visible through observation.

use super::data::DataError;
use super::ids::TaskId;
use super::state::TaskState;
use super::task::WorkType;
use crate::graph::GraphError;

/// Operational classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Likely to succeed if repeated.
    Transient,
    /// Repeating will not help (corrupt record, schema mismatch, ...).
    Permanent,
    /// Backend unavailable (connection refused, disk gone, ...).
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
#[error("store error ({kind:?}): {message}")]
pub struct StoreError {
    kind: ErrorKind,
    message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Infrastructure, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient | ErrorKind::Infrastructure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("work type must not be empty")]
    EmptyWorkType,

    #[error("no executor handles work type '{0}'")]
    UnknownWorkType(WorkType),

    #[error("tags must not be empty strings")]
    EmptyTag,

    #[error("unique name must not be empty")]
    EmptyUniqueName,

    #[error("periodic interval must be positive")]
    NonPositiveInterval,

    #[error("periodic flex must be positive")]
    NonPositiveFlex,

    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("expedited work cannot be delayed")]
    ExpeditedWithDelay,

    #[error("expedited work cannot be periodic")]
    ExpeditedPeriodic,

    #[error("expedited work only supports network and storage constraints")]
    ExpeditedConstraints,

    #[error("periodic work cannot be part of a chain or graph")]
    PeriodicInGraph,

    #[error("a submission needs at least one task")]
    EmptyBatch,

    #[error(transparent)]
    Data(#[from] DataError),
}

/// A forbidden state-machine move. Internal invariant violation; the
/// scheduler logs it and leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition for {task_id}: {from} -> {to}")]
pub struct TransitionError {
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid work graph: {0}")]
    Graph(#[from] GraphError),

    #[error("store operation '{operation}' failed after {attempts} attempt(s): {source}")]
    Store {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("scheduler has been shut down")]
    Shutdown,
}

impl From<DataError> for SchedulerError {
    fn from(err: DataError) -> Self {
        SchedulerError::Validation(ValidationError::Data(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(StoreError::transient("timeout").is_retryable());
        assert!(StoreError::unavailable("down").is_retryable());
        assert!(!StoreError::permanent("corrupt").is_retryable());
    }

    #[test]
    fn validation_errors_wrap_into_scheduler_errors() {
        let err: SchedulerError = ValidationError::EmptyWorkType.into();
        assert!(err.to_string().contains("work type must not be empty"));

        let err: SchedulerError = DataError::TooLarge { size: 20, limit: 10 }.into();
        assert!(matches!(
            err,
            SchedulerError::Validation(ValidationError::Data(_))
        ));
    }
}
