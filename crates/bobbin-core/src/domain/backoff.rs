//! Retry backoff: decides the delay before a task re-enters eligibility.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shape of the retry delay curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    Linear,
    #[default]
    Exponential,
}

/// Backoff policy plus base delay.
///
/// `attempt` is the task's attempt count *after* the increment for the
/// current retry request, so the first retry passes 1.
///
/// Example with base=10s:
/// - Linear:      10s, 20s, 30s, ...
/// - Exponential: 10s, 20s, 40s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Backoff {
    pub policy: BackoffPolicy,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
}

impl Backoff {
    pub fn linear(base_delay: Duration) -> Self {
        Self {
            policy: BackoffPolicy::Linear,
            base_delay,
        }
    }

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            policy: BackoffPolicy::Exponential,
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.policy {
            BackoffPolicy::Linear => self.base_delay.saturating_mul(attempt.max(1)),
            BackoffPolicy::Exponential => {
                let exponent = attempt.max(1) - 1;
                // 2^31 * any sane base is far past the configured cap anyway.
                let factor = 1u32 << exponent.min(31);
                self.base_delay.saturating_mul(factor)
            }
        }
    }

    /// Same as [`Backoff::delay_for`], capped at `max`.
    pub fn capped_delay_for(&self, attempt: u32, max: Duration) -> Duration {
        self.delay_for(attempt).min(max)
    }
}

impl Default for Backoff {
    /// Exponential, 30s base.
    fn default() -> Self {
        Self::exponential(Duration::from_secs(30))
    }
}

pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub(crate) mod opt_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis().min(u64::MAX as u128) as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
