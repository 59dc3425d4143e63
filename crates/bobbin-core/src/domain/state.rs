//! Task state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Blocked -> Enqueued (all prerequisites Succeeded)
/// - Enqueued -> Running (dispatched to the executor)
/// - Running -> Succeeded | Failed
/// - Running -> Enqueued (retry after backoff, or next period of a periodic task)
/// - Enqueued | Blocked | Running -> Cancelled
///
/// Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Eligible once constraints are satisfied and the delay elapsed.
    Enqueued,

    /// Waiting for at least one prerequisite.
    Blocked,

    /// Handed to the executor.
    Running,

    Succeeded,

    Failed,

    Cancelled,
}

impl TaskState {
    pub const ALL: [TaskState; 6] = [
        TaskState::Enqueued,
        TaskState::Blocked,
        TaskState::Running,
        TaskState::Succeeded,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Enqueued, Blocked or Running.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Blocked, Enqueued) => true,
            (Enqueued, Running) => true,
            (Running, Succeeded | Failed | Enqueued) => true,
            (Enqueued | Blocked | Running, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Enqueued => "enqueued",
            TaskState::Blocked => "blocked",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Succeeded)]
    #[case(TaskState::Failed)]
    #[case(TaskState::Cancelled)]
    fn terminal_states_have_no_way_out(#[case] terminal: TaskState) {
        assert!(terminal.is_terminal());
        for next in TaskState::ALL {
            assert!(
                !terminal.can_transition_to(next),
                "{terminal} -> {next} must be rejected"
            );
        }
    }

    #[rstest]
    #[case(TaskState::Blocked, TaskState::Enqueued)]
    #[case(TaskState::Enqueued, TaskState::Running)]
    #[case(TaskState::Running, TaskState::Succeeded)]
    #[case(TaskState::Running, TaskState::Failed)]
    #[case(TaskState::Running, TaskState::Enqueued)]
    #[case(TaskState::Blocked, TaskState::Cancelled)]
    #[case(TaskState::Running, TaskState::Cancelled)]
    fn allowed_transitions(#[case] from: TaskState, #[case] to: TaskState) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case(TaskState::Blocked, TaskState::Running)]
    #[case(TaskState::Enqueued, TaskState::Succeeded)]
    #[case(TaskState::Enqueued, TaskState::Blocked)]
    fn rejected_transitions(#[case] from: TaskState, #[case] to: TaskState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&TaskState::Cancelled).unwrap();
        assert_eq!(s, "\"cancelled\"");
    }
}
