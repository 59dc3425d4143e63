//! Keyed async locks.
//!
//! State changes are serialized per DAG group and per unique name, never
//! globally. Acquisition order is always name, then graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ids::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LockKey {
    /// Unique name: dedup resolution.
    Name(String),
    /// DAG group (`TaskRecord::graph_id`): transitions and readiness.
    Graph(TaskId),
}

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    table: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(key).or_default())
        };
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on.
    pub(crate) fn purge_idle(&self) -> usize {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let before = table.len();
        // Only the table holds the Arc; new lockers clone under this mutex,
        // so the count cannot grow concurrently.
        table.retain(|_, m| Arc::strong_count(m) > 1);
        before - table.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
