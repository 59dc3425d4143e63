//! Decision model: what the scheduler does with a finished run.
//!
//! The Decider is a pure function of (record, outcome). Applying the
//! decision (state transition, timers, dependents) is the scheduler's job.

use std::time::Duration;

use super::data::Data;
use super::outcome::Outcome;
use super::task::TaskRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Running -> Succeeded.
    Complete { output: Data },

    /// Running -> Failed; dependents are cancelled.
    Fail { output: Data },

    /// Running -> Enqueued, eligible after `delay`. `attempt` is the new
    /// attempt count.
    Retry { delay: Duration, attempt: u32 },

    /// Periodic task finished a run: Running -> Enqueued for the next period.
    Reschedule { delay: Duration, output: Data },
}

pub trait Decider: Send + Sync {
    fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> Decision;
}

/// Default decider.
///
/// - Success / Failure of a one-time task are final.
/// - Success / Failure of a periodic task reschedule it.
/// - Retry increments the attempt count and uses the task's backoff, capped
///   at `max_backoff`. If the task carries `max_attempts` and this run was
///   the last allowed one, the retry becomes a failure instead.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    max_backoff: Duration,
}

impl DefaultDecider {
    pub fn new(max_backoff: Duration) -> Self {
        Self { max_backoff }
    }
}

impl Default for DefaultDecider {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60 * 60))
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> Decision {
        let reschedule = |output: Data| Decision::Reschedule {
            delay: task.schedule.period_delay().unwrap_or_default(),
            output,
        };

        match outcome {
            Outcome::Success(output) if task.is_periodic() => reschedule(output.clone()),
            Outcome::Failure(output) if task.is_periodic() => reschedule(output.clone()),
            Outcome::Success(output) => Decision::Complete {
                output: output.clone(),
            },
            Outcome::Failure(output) => Decision::Fail {
                output: output.clone(),
            },
            Outcome::Retry => {
                let attempt = task.attempt_count + 1;
                if let Some(max) = task.max_attempts.filter(|max| attempt >= *max) {
                    if task.is_periodic() {
                        return reschedule(Data::empty());
                    }
                    let output = Outcome::failure_reason(format!("max attempts reached ({max})"));
                    return Decision::Fail {
                        output: output.into_output(),
                    };
                }
                Decision::Retry {
                    delay: task.backoff.capped_delay_for(attempt, self.max_backoff),
                    attempt,
                }
            }
        }
    }
}
