//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてスケジューラを実装します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング（起動時検証）
//! - **Scheduler**: 投入・依存解決・キャンセル・リトライの中核
//! - **Dispatcher**: ready queue からタスクを起動するループ
//! - **ObservationHub**: タスク状態の購読

pub mod builder;
pub mod dispatcher;
mod locks;
pub mod observer;
mod queue;
pub mod scheduler;
pub mod status;
mod store_retry;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::dispatcher::Dispatcher;
pub use self::observer::{ObservationHub, Subscription};
pub use self::scheduler::{RecoveryReport, Scheduler};
pub use self::status::StateCounts;
