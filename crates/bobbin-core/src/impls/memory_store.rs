//! InMemoryTaskStore - 開発用・テスト用の Work Record Store
//!
//! # 実装詳細
//! - HashMap<TaskId, TaskRecord> を tokio RwLock で保護
//! - compare_and_set は write lock 内で state を比較してから上書き
//! - 一覧系は seq 順（作成順）で返す

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::ids::TaskId;
use crate::domain::state::TaskState;
use crate::domain::task::TaskRecord;
use crate::ports::TaskStore;

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn select(&self, pred: impl Fn(&TaskRecord) -> bool) -> Vec<TaskRecord> {
        let records = self.records.read().await;
        let mut out: Vec<TaskRecord> = records.values().filter(|r| pred(r)).cloned().collect();
        out.sort_by_key(|r| r.seq);
        out
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        expected: TaskState,
        record: &TaskRecord,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(current) if current.state == expected => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn load_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.select(|r| r.has_tag(tag)).await)
    }

    async fn load_by_unique_name(&self, name: &str) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self
            .select(|r| r.unique_name.as_deref() == Some(name))
            .await)
    }

    async fn load_active(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.select(|r| r.state.is_active()).await)
    }

    async fn load_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.select(|_| true).await)
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn delete_terminal(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut records = self.records.write().await;
        let mut removed: Vec<(u64, TaskId)> = records
            .values()
            .filter(|r| r.state.is_terminal())
            .map(|r| (r.seq, r.id))
            .collect();
        removed.sort();
        for (_, id) in &removed {
            records.remove(id);
        }
        Ok(removed.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backoff::Backoff;
    use crate::domain::task::TaskSpec;
    use chrono::Utc;

    fn record(n: u128, tag: &str) -> TaskRecord {
        let id = TaskId::from_u128(n);
        TaskRecord::new(
            id,
            id,
            n as u64,
            TaskSpec::new("x").with_tag(tag),
            Backoff::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let store = InMemoryTaskStore::new();
        let r = record(1, "a");
        store.save(&r).await.unwrap();

        assert_eq!(store.load(r.id).await.unwrap(), Some(r));
        assert_eq!(store.load(TaskId::from_u128(99)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_set_only_writes_on_expected_state() {
        let store = InMemoryTaskStore::new();
        let mut r = record(1, "a");
        store.save(&r).await.unwrap();

        r.transition(TaskState::Running, Utc::now()).unwrap();
        assert!(store.compare_and_set(TaskState::Enqueued, &r).await.unwrap());

        // stored state is Running now; a second Enqueued-based write loses
        let mut stale = r.clone();
        stale.state = TaskState::Cancelled;
        assert!(!store.compare_and_set(TaskState::Enqueued, &stale).await.unwrap());
        assert_eq!(
            store.load(r.id).await.unwrap().unwrap().state,
            TaskState::Running
        );
    }

    #[tokio::test]
    async fn compare_and_set_on_missing_record_fails() {
        let store = InMemoryTaskStore::new();
        let r = record(1, "a");
        assert!(!store.compare_and_set(TaskState::Enqueued, &r).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn queries_filter_and_keep_creation_order() {
        let store = InMemoryTaskStore::new();
        for (n, tag) in [(3, "a"), (1, "a"), (2, "b")] {
            store.save(&record(n, tag)).await.unwrap();
        }

        let ids: Vec<_> = store
            .load_by_tag("a")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![TaskId::from_u128(1), TaskId::from_u128(3)]);
        assert_eq!(store.load_active().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_terminal_removes_only_finished_records() {
        let store = InMemoryTaskStore::new();
        let mut done = record(1, "a");
        done.transition(TaskState::Cancelled, Utc::now()).unwrap();
        store.save(&done).await.unwrap();
        store.save(&record(2, "a")).await.unwrap();

        assert_eq!(store.delete_terminal().await.unwrap(), vec![done.id]);
        assert_eq!(store.len().await, 1);
        assert!(!store.delete(done.id).await.unwrap());
    }
}
