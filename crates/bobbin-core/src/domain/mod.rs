//! Domain model (ids, specs, records, outcomes, policies).
//!
//! Pure types only: nothing here touches the store, timers or executors.

pub mod backoff;
pub mod constraints;
pub mod data;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod schedule;
pub mod state;
pub mod task;
pub mod unique;

pub use backoff::{Backoff, BackoffPolicy};
pub use constraints::{Constraints, Environment, NetworkRequirement, NetworkState, is_satisfied};
pub use data::{Data, DataBuilder, DataError, MAX_DATA_BYTES, Value};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ErrorKind, SchedulerError, StoreError, TransitionError, ValidationError};
pub use events::TaskSnapshot;
pub use ids::{SubscriptionId, TaskId};
pub use outcome::{Outcome, OutcomeKind};
pub use schedule::{MIN_PERIODIC_FLEX, MIN_PERIODIC_INTERVAL, PeriodicFloors, Schedule};
pub use state::TaskState;
pub use task::{OutOfQuotaPolicy, TaskRecord, TaskSpec, WorkType};
pub use unique::{DedupResolution, ExistingWorkPolicy, UniqueSubmission};
