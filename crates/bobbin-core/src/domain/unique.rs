//! Unique-name dedup policies.

use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// How a submission under a unique name treats existing work with that name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingWorkPolicy {
    /// Cancel active work with the name, then submit.
    Replace,
    /// Keep active work; the submission is discarded.
    Keep,
    /// Chain after the most recent task with the name.
    Append,
    /// Append, unless the predecessor failed (or was cancelled): then start fresh.
    AppendOrReplace,
}

/// How a unique submission was resolved. Informational, never a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum DedupResolution {
    /// No existing work with the name; submitted as-is.
    Created,
    /// Active work existed; nothing new was created.
    KeptExisting,
    /// These active tasks were cancelled first.
    Replaced { cancelled: Vec<TaskId> },
    /// New work depends on this predecessor.
    Appended { after: TaskId },
    /// Predecessor had failed; new work starts a fresh chain instead.
    ReplacedFailed { predecessor: TaskId },
}

/// Result of a unique submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSubmission {
    /// Ids of the submitted tasks, or of the kept ones under `Keep`.
    pub ids: Vec<TaskId>,
    pub resolution: DedupResolution,
}

impl UniqueSubmission {
    /// The id a single-task submission resolves to (last in the batch).
    pub fn id(&self) -> Option<TaskId> {
        self.ids.last().copied()
    }

    pub fn created_new(&self) -> bool {
        self.resolution != DedupResolution::KeptExisting
    }
}
