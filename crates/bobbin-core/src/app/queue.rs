//! Ready queue: due timers, the ready list, and constraint-gated tasks.
//!
//! Holds task ids only; the store record stays the source of truth and is
//! re-checked at dispatch. Each arm hands out a fresh ticket; entries whose
//! ticket is no longer current (re-armed, disarmed) are dropped lazily.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: TaskId,
    ticket: u64,
}

/// Timer entry for the scheduled heap.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    at: Instant,
    front: bool,
    entry: Entry,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.entry.ticket.cmp(&self.entry.ticket))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Live ticket per armed task.
    tickets: HashMap<TaskId, u64>,
    next_ticket: u64,
    ready: VecDeque<Entry>,
    scheduled: BinaryHeap<Scheduled>,
    /// Waiting for an environment change.
    gated: Vec<Entry>,
}

impl QueueState {
    fn issue(&mut self, id: TaskId) -> Entry {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.tickets.insert(id, ticket);
        Entry { id, ticket }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        self.tickets.get(&entry.id) == Some(&entry.ticket)
    }

    fn push_ready(&mut self, entry: Entry, front: bool) {
        if front {
            self.ready.push_front(entry);
        } else {
            self.ready.push_back(entry);
        }
    }

    /// Pop timer entries at the top of the heap that are no longer live, and
    /// compact the heap once dead entries outnumber live ones.
    fn drop_dead_timers(&mut self) {
        while let Some(top) = self.scheduled.peek() {
            if self.is_live(&top.entry) {
                break;
            }
            self.scheduled.pop();
        }
        if self.scheduled.len() > 2 * self.tickets.len() + 16 {
            let tickets = &self.tickets;
            self.scheduled
                .retain(|s| tickets.get(&s.entry.id) == Some(&s.entry.ticket));
        }
    }

    /// Move tasks from scheduled to ready if their time has come.
    fn promote_due(&mut self, now: Instant) {
        while let Some(top) = self.scheduled.peek() {
            if top.at > now {
                break;
            }
            if let Some(s) = self.scheduled.pop()
                && self.is_live(&s.entry)
            {
                self.push_ready(s.entry, s.front);
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `id` eligible at `at`. `front` puts it ahead of ordinary work
    /// once due (expedited). Replaces any earlier arming of the same id.
    pub(crate) fn arm(&self, id: TaskId, at: Instant, front: bool) {
        {
            let mut st = self.state();
            let entry = st.issue(id);
            if at <= Instant::now() {
                st.push_ready(entry, front);
            } else {
                st.scheduled.push(Scheduled { at, front, entry });
            }
            st.drop_dead_timers();
        }
        self.notify.notify_one();
    }

    pub(crate) fn disarm(&self, id: TaskId) {
        let mut st = self.state();
        st.tickets.remove(&id);
        st.drop_dead_timers();
    }

    /// Park `id` until the next environment change.
    pub(crate) fn gate(&self, id: TaskId) {
        let mut st = self.state();
        let entry = st.issue(id);
        st.gated.push(entry);
    }

    /// Environment changed: every gated task gets re-checked.
    pub(crate) fn release_gated(&self) -> usize {
        let released = {
            let mut st = self.state();
            let gated = std::mem::take(&mut st.gated);
            let mut n = 0;
            for entry in gated {
                if st.is_live(&entry) {
                    st.ready.push_back(entry);
                    n += 1;
                }
            }
            n
        };
        if released > 0 {
            self.notify.notify_one();
        }
        released
    }

    /// Next due task, promoting expired timers first.
    pub(crate) fn pop_ready(&self, now: Instant) -> Option<TaskId> {
        let mut st = self.state();
        st.promote_due(now);
        while let Some(entry) = st.ready.pop_front() {
            if st.is_live(&entry) {
                st.tickets.remove(&entry.id);
                return Some(entry.id);
            }
        }
        None
    }

    pub(crate) fn next_wake(&self) -> Option<Instant> {
        let mut st = self.state();
        st.drop_dead_timers();
        st.scheduled.peek().map(|s| s.at)
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, id: TaskId) -> bool {
        self.state().tickets.contains_key(&id)
    }

    #[cfg(test)]
    fn timer_count(&self) -> usize {
        self.state().scheduled.len()
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(n: u128) -> TaskId {
        TaskId::from_u128(n)
    }

    #[tokio::test(start_paused = true)]
    async fn due_tasks_pop_in_time_order() {
        let q = ReadyQueue::new();
        let now = Instant::now();
        q.arm(id(1), now + Duration::from_secs(20), false);
        q.arm(id(2), now + Duration::from_secs(10), false);
        q.arm(id(3), now, false);

        assert_eq!(q.pop_ready(Instant::now()), Some(id(3)));
        assert_eq!(q.pop_ready(Instant::now()), None);
        assert_eq!(q.next_wake(), Some(now + Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(q.pop_ready(Instant::now()), Some(id(2)));
        assert_eq!(q.pop_ready(Instant::now()), Some(id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn front_entries_jump_the_line() {
        let q = ReadyQueue::new();
        let now = Instant::now();
        q.arm(id(1), now, false);
        q.arm(id(2), now, true);
        assert_eq!(q.pop_ready(now), Some(id(2)));
        assert_eq!(q.pop_ready(now), Some(id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_and_rearmed_entries_are_dropped() {
        let q = ReadyQueue::new();
        let now = Instant::now();
        q.arm(id(1), now, false);
        q.disarm(id(1));
        assert!(!q.is_armed(id(1)));

        q.arm(id(2), now, false);
        q.arm(id(2), now + Duration::from_secs(5), false);
        assert_eq!(q.pop_ready(now), None);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(q.pop_ready(Instant::now()), Some(id(2)));
        assert_eq!(q.pop_ready(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_timers_do_not_linger() {
        let q = ReadyQueue::new();
        let now = Instant::now();
        let far = now + Duration::from_secs(100 * 365 * 24 * 60 * 60);

        q.arm(id(1), far, false);
        q.disarm(id(1));
        assert_eq!(q.next_wake(), None);
        assert_eq!(q.timer_count(), 0);

        q.arm(id(2), now + Duration::from_secs(10), false);
        q.arm(id(2), now + Duration::from_secs(30), false);
        assert_eq!(q.next_wake(), Some(now + Duration::from_secs(30)));
        assert_eq!(q.timer_count(), 1);

        // buried dead entries are compacted away
        q.arm(id(3), now + Duration::from_secs(5), false);
        for n in 100..200 {
            q.arm(id(n), far, false);
            q.disarm(id(n));
        }
        assert!(q.timer_count() <= 20);
        assert_eq!(q.next_wake(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn gated_tasks_wait_for_release() {
        let q = ReadyQueue::new();
        q.gate(id(1));
        assert_eq!(q.pop_ready(Instant::now()), None);
        assert!(q.is_armed(id(1)));

        assert_eq!(q.release_gated(), 1);
        assert_eq!(q.pop_ready(Instant::now()), Some(id(1)));
        assert_eq!(q.release_gated(), 0);
    }
}
