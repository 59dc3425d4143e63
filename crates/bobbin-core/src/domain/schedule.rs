//! One-time vs periodic schedules and the periodic floor clamp.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::{duration_millis, opt_duration_millis};

/// Minimum periodic interval (15 minutes).
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Minimum periodic flex window (5 minutes).
pub const MIN_PERIODIC_FLEX: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    OneTime,
    Periodic {
        #[serde(with = "duration_millis")]
        interval: Duration,
        #[serde(default, with = "opt_duration_millis")]
        flex: Option<Duration>,
    },
}

/// Floors applied by [`Schedule::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicFloors {
    pub min_interval: Duration,
    pub min_flex: Duration,
}

impl Default for PeriodicFloors {
    fn default() -> Self {
        Self {
            min_interval: MIN_PERIODIC_INTERVAL,
            min_flex: MIN_PERIODIC_FLEX,
        }
    }
}

impl Schedule {
    pub fn periodic(interval: Duration) -> Self {
        Schedule::Periodic {
            interval,
            flex: None,
        }
    }

    pub fn periodic_with_flex(interval: Duration, flex: Duration) -> Self {
        Schedule::Periodic {
            interval,
            flex: Some(flex),
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Schedule::Periodic { .. })
    }

    /// Raise interval / flex to the floors. Returns the clamped schedule and
    /// a human-readable warning per adjustment. Never fails: a zero interval
    /// is rejected earlier, at validation.
    pub fn clamped(self, floors: PeriodicFloors) -> (Schedule, Vec<String>) {
        let Schedule::Periodic { interval, flex } = self else {
            return (self, Vec::new());
        };

        let mut warnings = Vec::new();
        let mut interval = interval;
        if interval < floors.min_interval {
            warnings.push(format!(
                "periodic interval {:?} is below the minimum {:?}; using {:?}",
                interval, floors.min_interval, floors.min_interval
            ));
            interval = floors.min_interval;
        }

        let flex = flex.map(|flex| {
            let clamped = flex.max(floors.min_flex).min(interval);
            if clamped != flex {
                warnings.push(format!(
                    "periodic flex {:?} is outside [{:?}, {:?}]; using {:?}",
                    flex, floors.min_flex, interval, clamped
                ));
            }
            clamped
        });

        (Schedule::Periodic { interval, flex }, warnings)
    }

    /// Delay between the start of one period and the opening of the next
    /// run window. `None` for one-time schedules.
    pub fn period_delay(&self) -> Option<Duration> {
        match *self {
            Schedule::OneTime => None,
            Schedule::Periodic { interval, flex } => Some(match flex {
                Some(flex) if flex < interval => interval - flex,
                _ => interval,
            }),
        }
    }

    /// Extra delay before the first run window of a periodic schedule opens.
    pub fn first_window_delay(&self) -> Duration {
        match *self {
            Schedule::Periodic {
                interval,
                flex: Some(flex),
            } if flex < interval => interval - flex,
            _ => Duration::ZERO,
        }
    }
}
