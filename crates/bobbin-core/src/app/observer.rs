//! Observation Hub.
//!
//! Subscribers register by task id, tag or unique name and receive
//! snapshots over unbounded channels, so a slow subscriber never stalls
//! the scheduler. The scheduler publishes while holding the task's graph
//! lock, which keeps per-task delivery in transition order.
//!
//! A new subscriber first gets the current state (replay-one), then every
//! later change. Registration happens before the store is read; updates
//! that race with that read are buffered and merged by revision.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::events::TaskSnapshot;
use crate::domain::ids::{SubscriptionId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Filter {
    Id(TaskId),
    Tag(String),
    Name(String),
}

impl Filter {
    fn matches(&self, s: &TaskSnapshot) -> bool {
        match self {
            Filter::Id(id) => s.id == *id,
            Filter::Tag(tag) => s.tags.contains(tag),
            Filter::Name(name) => s.unique_name.as_deref() == Some(name.as_str()),
        }
    }
}

enum Sink {
    Single(mpsc::UnboundedSender<Option<TaskSnapshot>>),
    List(mpsc::UnboundedSender<Vec<TaskSnapshot>>),
}

struct Subscriber {
    filter: Filter,
    snapshots: BTreeMap<TaskId, TaskSnapshot>,
    seeded: bool,
    sink: Sink,
}

impl Subscriber {
    /// Returns `false` once the receiver is gone.
    fn emit(&self) -> bool {
        match &self.sink {
            Sink::Single(tx) => tx.send(self.snapshots.values().next().cloned()).is_ok(),
            Sink::List(tx) => tx.send(self.snapshots.values().cloned().collect()).is_ok(),
        }
    }

    /// Keep the newer of the two revisions. Returns whether anything changed.
    fn merge(&mut self, snapshot: TaskSnapshot) -> bool {
        match self.snapshots.get(&snapshot.id) {
            Some(current) if current.revision > snapshot.revision || *current == snapshot => false,
            _ => {
                self.snapshots.insert(snapshot.id, snapshot);
                true
            }
        }
    }
}

#[derive(Default)]
pub struct ObservationHub {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl ObservationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    pub(crate) fn register_single(
        self: &Arc<Self>,
        id: SubscriptionId,
        task: TaskId,
    ) -> Subscription<Option<TaskSnapshot>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(id, Filter::Id(task), Sink::Single(tx));
        Subscription::new(id, rx, Arc::downgrade(self))
    }

    pub(crate) fn register_list(
        self: &Arc<Self>,
        id: SubscriptionId,
        filter: Filter,
    ) -> Subscription<Vec<TaskSnapshot>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(id, filter, Sink::List(tx));
        Subscription::new(id, rx, Arc::downgrade(self))
    }

    fn insert(&self, id: SubscriptionId, filter: Filter, sink: Sink) {
        debug!(subscription = %id, ?filter, "subscribed");
        self.subscribers().insert(
            id,
            Subscriber {
                filter,
                snapshots: BTreeMap::new(),
                seeded: false,
                sink,
            },
        );
    }

    /// Deliver the initial state loaded from the store. Updates buffered
    /// since registration win when their revision is newer.
    pub(crate) fn seed(&self, id: SubscriptionId, loaded: Vec<TaskSnapshot>) {
        let mut subs = self.subscribers();
        let Some(sub) = subs.get_mut(&id) else {
            return;
        };
        for snapshot in loaded {
            if sub.filter.matches(&snapshot) {
                sub.merge(snapshot);
            }
        }
        sub.seeded = true;
        if !sub.emit() {
            subs.remove(&id);
        }
    }

    /// A task changed.
    pub(crate) fn publish(&self, snapshot: &TaskSnapshot) {
        let mut subs = self.subscribers();
        let mut closed = Vec::new();
        for (sid, sub) in subs.iter_mut() {
            if !sub.filter.matches(snapshot) {
                continue;
            }
            if sub.merge(snapshot.clone()) && sub.seeded && !sub.emit() {
                closed.push(*sid);
            }
        }
        for sid in closed {
            debug!(subscription = %sid, "receiver dropped; removing subscriber");
            subs.remove(&sid);
        }
    }

    /// Records were pruned from the store.
    pub(crate) fn publish_removed(&self, ids: &[TaskId]) {
        let mut subs = self.subscribers();
        let mut closed = Vec::new();
        for (sid, sub) in subs.iter_mut() {
            let mut changed = false;
            for id in ids {
                changed |= sub.snapshots.remove(id).is_some();
            }
            if changed && sub.seeded && !sub.emit() {
                closed.push(*sid);
            }
        }
        for sid in closed {
            subs.remove(&sid);
        }
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "unsubscribed");
        }
        removed
    }
}

/// Caller-owned handle to a snapshot stream. Dropping it unsubscribes.
///
/// - by id: `Option<TaskSnapshot>` (`None` when the record does not exist,
///   or was pruned)
/// - by tag / unique name: the full list of matching snapshots, in id order
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
    hub: Weak<ObservationHub>,
}

impl<T> Subscription<T> {
    fn new(id: SubscriptionId, rx: mpsc::UnboundedReceiver<T>, hub: Weak<ObservationHub>) -> Self {
        Self { id, rx, hub }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next update. `None` once the scheduler is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Most recent update already delivered, skipping older ones.
    pub fn latest(&mut self) -> Option<T> {
        let mut last = None;
        while let Ok(v) = self.rx.try_recv() {
            last = Some(v);
        }
        last
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
