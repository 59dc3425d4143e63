//! Snapshots published to observers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data::Data;
use super::ids::TaskId;
use super::state::TaskState;
use super::task::{TaskRecord, WorkType};

/// Observer-facing view of a task at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub work_type: WorkType,
    pub state: TaskState,
    pub tags: BTreeSet<String>,
    pub unique_name: Option<String>,
    pub output: Option<Data>,
    pub progress: Option<Data>,
    pub attempt_count: u32,
    pub depends_on: Vec<TaskId>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub warnings: Vec<String>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&TaskRecord> for TaskSnapshot {
    fn from(r: &TaskRecord) -> Self {
        Self {
            id: r.id,
            work_type: r.work_type.clone(),
            state: r.state,
            tags: r.tags.clone(),
            unique_name: r.unique_name.clone(),
            output: r.output.clone(),
            progress: r.progress.clone(),
            attempt_count: r.attempt_count,
            depends_on: r.depends_on.clone(),
            next_run_at: r.next_run_at,
            warnings: r.warnings.clone(),
            revision: r.revision,
            updated_at: r.updated_at,
        }
    }
}

impl TaskSnapshot {
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
