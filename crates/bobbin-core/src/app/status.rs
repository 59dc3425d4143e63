//! Status - ステータスクエリ

use serde::Serialize;

use crate::domain::state::TaskState;
use crate::domain::task::TaskRecord;

/// Record counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub enqueued: usize,
    pub blocked: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StateCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut counts = Self::default();
        for r in records {
            counts.add(r.state);
        }
        counts
    }

    fn add(&mut self, state: TaskState) {
        match state {
            TaskState::Enqueued => self.enqueued += 1,
            TaskState::Blocked => self.blocked += 1,
            TaskState::Running => self.running += 1,
            TaskState::Succeeded => self.succeeded += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Cancelled => self.cancelled += 1,
        }
    }

    pub fn get(&self, state: TaskState) -> usize {
        match state {
            TaskState::Enqueued => self.enqueued,
            TaskState::Blocked => self.blocked,
            TaskState::Running => self.running,
            TaskState::Succeeded => self.succeeded,
            TaskState::Failed => self.failed,
            TaskState::Cancelled => self.cancelled,
        }
    }

    pub fn active(&self) -> usize {
        self.enqueued + self.blocked + self.running
    }

    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn total(&self) -> usize {
        self.active() + self.terminal()
    }
}
