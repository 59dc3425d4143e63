//! TaskStore port - Work Record Store
//!
//! The store is the source of truth for task records, dependency edges
//! included. The scheduler serializes writes per DAG group; the store
//! only has to make `compare_and_set` atomic on `state`.

use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::ids::TaskId;
use crate::domain::state::TaskState;
use crate::domain::task::TaskRecord;

/// Persistence contract for task records.
///
/// # 設計原則
/// - `compare_and_set` は `state` に対してアトミック
/// - すべての状態はここから再構築可能（`recover`）
/// - 一時的な障害は `ErrorKind::Transient` で返す（呼び出し側がリトライ）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or overwrite unconditionally.
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Overwrite only if the stored record is currently in `expected`.
    /// Returns `false` (and writes nothing) when the state moved on, or
    /// when the record no longer exists.
    async fn compare_and_set(
        &self,
        expected: TaskState,
        record: &TaskRecord,
    ) -> Result<bool, StoreError>;

    async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    async fn load_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, StoreError>;

    async fn load_by_unique_name(&self, name: &str) -> Result<Vec<TaskRecord>, StoreError>;

    /// Records in a non-terminal state.
    async fn load_active(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Remove every terminal record; returns the removed ids.
    async fn delete_terminal(&self) -> Result<Vec<TaskId>, StoreError>;
}
