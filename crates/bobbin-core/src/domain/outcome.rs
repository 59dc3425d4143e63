//! Outcome model: what the executor reports back for one run.
//!
//! This module does not assume queues, workers or persistence. It only
//! defines the shape of results the scheduler reacts to.

use serde::{Deserialize, Serialize};

use super::data::Data;

/// Classification of a run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    Retry,
}

/// Result of one run.
///
/// - `Success`: output is attached, dependents may become eligible.
/// - `Failure`: output is retained for inspection, dependents are cancelled.
/// - `Retry`: run again after the task's backoff delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "output", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success(Data),
    Failure(Data),
    Retry,
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Success(Data::empty())
    }

    pub fn success_with(output: Data) -> Self {
        Outcome::Success(output)
    }

    pub fn failure() -> Self {
        Outcome::Failure(Data::empty())
    }

    pub fn failure_with(output: Data) -> Self {
        Outcome::Failure(output)
    }

    /// Failure carrying a single `error` key.
    pub fn failure_reason(reason: impl Into<String>) -> Self {
        let output = Data::builder()
            .put("error", reason.into())
            .build()
            .unwrap_or_default();
        Outcome::Failure(output)
    }

    pub fn retry() -> Self {
        Outcome::Retry
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Failure(_) => OutcomeKind::Failure,
            Outcome::Retry => OutcomeKind::Retry,
        }
    }

    /// Output data of the run; `Retry` carries none.
    pub fn into_output(self) -> Data {
        match self {
            Outcome::Success(d) | Outcome::Failure(d) => d,
            Outcome::Retry => Data::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_screaming_case() {
        let s = serde_json::to_string(&OutcomeKind::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&OutcomeKind::Retry).unwrap();
        assert_eq!(s, "\"RETRY\"");
    }

    #[test]
    fn outcome_is_adjacently_tagged() {
        let o = Outcome::failure_reason("disk full");
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["kind"], "FAILURE");
        assert_eq!(v["output"]["error"], "disk full");

        let v = serde_json::to_value(Outcome::retry()).unwrap();
        assert_eq!(v["kind"], "RETRY");
    }

    #[test]
    fn failure_reason_survives_oversized_messages() {
        let o = Outcome::failure_reason("x".repeat(64 * 1024));
        assert_eq!(o.kind(), OutcomeKind::Failure);
    }
}
