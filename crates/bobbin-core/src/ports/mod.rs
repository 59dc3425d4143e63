//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（永続化、実行環境、時刻、ID）へのインターフェース。
//! The scheduler depends on these traits only.

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{Executor, ProgressSink, WorkContext, WorkItem};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
