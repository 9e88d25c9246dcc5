//! Refresher Queue
//!
//! The refresher decides the order in which observers are updated.
//!
//! # Algorithm
//!
//! Pending work sits in a min-heap ordered by `(priority, key, seq)`:
//!
//! 1. Notifying a source pushes each of its observers at the observer's
//!    priority. Nothing is deduplicated on the way in.
//! 2. Because the key is part of the ordering, every pending entry for the
//!    same observer at the same priority ends up adjacent in pop order.
//! 3. Popping takes the lowest entry and then swallows the run of identical
//!    keys behind it, so a node notified by N ancestors updates once.
//! 4. Lower priority always pops first, hence ancestors before descendants.
//!
//! Cleanup jobs of disposed nodes travel through the same queue with a key
//! that is unique per job, so they are never collapsed.
//!
//! Entries remember the priority they were queued at. A node whose priority
//! was raised while it waited (a proxy switched to a deeper target, say) is
//! pushed back at its live priority when popped, so it still meets its
//! duplicates and still runs after its new ancestors.
//!
//! The queue is pure bookkeeping. Draining it is the runtime's business; the
//! refresher only hands out the [`DrainGuard`] that makes a drainer unique.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use futures_util::future::LocalBoxFuture;
use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::notifier::NotifierId;

/// A one-shot asynchronous teardown step.
pub type Cleanup = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum JobKey {
    Notify(NotifierId),
    Cleanup(u64),
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueItem {
    priority: u32,
    key: JobKey,
    seq: u64,
}

/// A unit of work handed to the drain loop.
pub enum Job {
    /// Run the update of this observer.
    Notify(NotifierId),
    /// Run a cleanup.
    Cleanup(Cleanup),
}

/// Counters for the whole queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefresherStats {
    pub scheduled: u64,
    pub serviced: u64,
    /// Entries swallowed because an identical one was popped with them.
    pub coalesced: u64,
    /// Entries pushed back because their node's priority went up.
    pub requeued: u64,
    pub cleanups: u64,
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<QueueItem>>,
    cleanups: HashMap<u64, Cleanup>,
    seq: u64,
    draining: bool,
    backlog_reported: bool,
    stats: RefresherStats,
}

/// Priority queue of pending updates plus the drain bookkeeping.
pub struct Refresher {
    queue: RefCell<Queue>,
    released: Notify,
}

/// Proof that the holder is the only one draining the queue.
///
/// Dropping it, whether the drain finished or its task was cancelled halfway,
/// frees the queue for the next drainer and wakes everyone waiting on
/// [`Refresher::released`].
pub struct DrainGuard<'a> {
    refresher: &'a Refresher,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        {
            let mut queue = self.refresher.queue.borrow_mut();
            queue.draining = false;
            queue.backlog_reported = false;
        }
        self.refresher.released.notify_waiters();
    }
}

impl Refresher {
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(Queue::default()),
            released: Notify::new(),
        }
    }

    /// Queue an update of `observer`.
    pub fn schedule(&self, priority: u32, observer: NotifierId) {
        self.push(priority, |_| JobKey::Notify(observer), None);
    }

    /// Queue a cleanup.
    pub fn schedule_cleanup(&self, priority: u32, cleanup: Cleanup) {
        self.push(priority, JobKey::Cleanup, Some(cleanup));
    }

    fn push(&self, priority: u32, key: impl FnOnce(u64) -> JobKey, cleanup: Option<Cleanup>) {
        let mut queue = self.queue.borrow_mut();
        queue.seq += 1;
        let seq = queue.seq;
        if let Some(cleanup) = cleanup {
            queue.cleanups.insert(seq, cleanup);
        }
        queue.heap.push(Reverse(QueueItem {
            priority,
            key: key(seq),
            seq,
        }));
        queue.stats.scheduled += 1;
    }

    /// Claim the queue. `None` while somebody else is draining it.
    pub fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        let mut queue = self.queue.borrow_mut();
        if queue.draining {
            return None;
        }
        queue.draining = true;
        queue.backlog_reported = false;
        Some(DrainGuard { refresher: self })
    }

    pub fn is_draining(&self) -> bool {
        self.queue.borrow().draining
    }

    /// Resolves the next time a [`DrainGuard`] is dropped.
    ///
    /// Registration happens when this is called, not when it is first polled.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }

    /// Pop the next job, collapsing duplicates of it.
    ///
    /// `live_priority` reports the current priority of a notifier. Entries
    /// queued below it are pushed back instead of being handed out.
    pub fn next_job(&self, live_priority: impl Fn(NotifierId) -> Option<u32>) -> Option<Job> {
        let mut queue = self.queue.borrow_mut();

        let mut current = loop {
            let Reverse(mut item) = queue.heap.pop()?;
            if let JobKey::Notify(id) = item.key {
                if let Some(live) = live_priority(id).filter(|live| *live > item.priority) {
                    item.priority = live;
                    queue.heap.push(Reverse(item));
                    queue.stats.requeued += 1;
                    continue;
                }
            }
            break item;
        };

        while queue
            .heap
            .peek()
            .is_some_and(|Reverse(next)| next.key == current.key)
        {
            if let Some(Reverse(next)) = queue.heap.pop() {
                current = next;
                queue.stats.coalesced += 1;
            }
        }

        match current.key {
            JobKey::Notify(id) => {
                queue.stats.serviced += 1;
                Some(Job::Notify(id))
            }
            JobKey::Cleanup(seq) => {
                queue.stats.cleanups += 1;
                // Cleanup keys are unique, the payload is always there.
                queue.cleanups.remove(&seq).map(Job::Cleanup)
            }
        }
    }

    /// Number of queued entries, duplicates included.
    pub fn pending(&self) -> usize {
        self.queue.borrow().heap.len()
    }

    /// Nothing queued and nobody draining.
    pub fn is_idle(&self) -> bool {
        let queue = self.queue.borrow();
        !queue.draining && queue.heap.is_empty()
    }

    /// The queue length, the first time it exceeds `limit` since the last
    /// drain started or ended.
    pub fn backlog(&self, limit: usize) -> Option<usize> {
        let mut queue = self.queue.borrow_mut();
        let pending = queue.heap.len();
        if pending <= limit || queue.backlog_reported {
            return None;
        }
        queue.backlog_reported = true;
        Some(pending)
    }

    pub fn stats(&self) -> RefresherStats {
        self.queue.borrow().stats
    }
}

impl Default for Refresher {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NotifierGraph;
    use futures_util::FutureExt;

    fn ids(count: usize) -> Vec<NotifierId> {
        let mut graph = NotifierGraph::new();
        (0..count).map(|i| graph.insert(format!("n{i}"), None)).collect()
    }

    fn queued(_: NotifierId) -> Option<u32> {
        None
    }

    fn drain(refresher: &Refresher) -> Vec<NotifierId> {
        let mut order = Vec::new();
        while let Some(job) = refresher.next_job(queued) {
            if let Job::Notify(id) = job {
                order.push(id);
            }
        }
        order
    }

    #[test]
    fn only_one_drainer_at_a_time() {
        let refresher = Refresher::new();
        let ids = ids(1);
        refresher.schedule(1, ids[0]);

        let guard = refresher.begin_drain().unwrap();
        assert!(refresher.begin_drain().is_none());
        assert!(!refresher.is_idle());

        drain(&refresher);
        assert!(!refresher.is_idle());
        drop(guard);
        assert!(refresher.is_idle());
        assert!(refresher.begin_drain().is_some());
    }

    #[test]
    fn dropped_guard_frees_a_half_drained_queue() {
        let refresher = Refresher::new();
        let ids = ids(2);
        refresher.schedule(1, ids[0]);
        refresher.schedule(2, ids[1]);

        let mut released = Box::pin(refresher.released());
        {
            let _guard = refresher.begin_drain().unwrap();
            assert!(refresher.next_job(queued).is_some());
        }
        assert!(released.as_mut().now_or_never().is_some());

        assert!(!refresher.is_draining());
        assert_eq!(refresher.pending(), 1);
        let _guard = refresher.begin_drain().unwrap();
        assert_eq!(drain(&refresher), vec![ids[1]]);
    }

    #[test]
    fn lower_priority_pops_first() {
        let refresher = Refresher::new();
        let ids = ids(3);

        refresher.schedule(3, ids[0]);
        refresher.schedule(1, ids[1]);
        refresher.schedule(2, ids[2]);

        assert_eq!(drain(&refresher), vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn interleaved_duplicates_collapse() {
        let refresher = Refresher::new();
        let ids = ids(3);

        // Pushed interleaved: x, y, x, z, x
        refresher.schedule(2, ids[0]);
        refresher.schedule(2, ids[1]);
        refresher.schedule(2, ids[0]);
        refresher.schedule(2, ids[2]);
        refresher.schedule(2, ids[0]);

        let order = drain(&refresher);
        assert_eq!(order.len(), 3);
        assert_eq!(order.iter().filter(|id| **id == ids[0]).count(), 1);

        let stats = refresher.stats();
        assert_eq!(stats.scheduled, 5);
        assert_eq!(stats.serviced, 3);
        assert_eq!(stats.coalesced, 2);
    }

    #[test]
    fn raised_entries_rejoin_their_duplicates() {
        let refresher = Refresher::new();
        let ids = ids(2);
        let (moved, between) = (ids[0], ids[1]);

        // `moved` was queued at 1, then raised to 3 and queued again there.
        refresher.schedule(1, moved);
        refresher.schedule(2, between);
        refresher.schedule(3, moved);

        let live = |id: NotifierId| (id == moved).then_some(3);
        let mut order = Vec::new();
        while let Some(Job::Notify(id)) = refresher.next_job(live) {
            order.push(id);
        }

        assert_eq!(order, vec![between, moved]);
        let stats = refresher.stats();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.coalesced, 1);
    }

    #[test]
    fn cleanups_are_never_collapsed() {
        let refresher = Refresher::new();
        let ids = ids(1);
        let noop = || -> Cleanup { Box::new(|| async {}.boxed_local()) };

        refresher.schedule_cleanup(1, noop());
        refresher.schedule_cleanup(1, noop());
        refresher.schedule(0, ids[0]);

        assert!(matches!(refresher.next_job(queued), Some(Job::Notify(_))));
        assert!(matches!(refresher.next_job(queued), Some(Job::Cleanup(_))));
        assert!(matches!(refresher.next_job(queued), Some(Job::Cleanup(_))));
        assert!(refresher.next_job(queued).is_none());
        assert_eq!(refresher.stats().cleanups, 2);
    }

    #[test]
    fn backlog_is_reported_once_per_drain() {
        let refresher = Refresher::new();
        let ids = ids(1);
        for _ in 0..3 {
            refresher.schedule(0, ids[0]);
        }
        assert_eq!(refresher.backlog(2), Some(3));
        refresher.schedule(0, ids[0]);
        assert_eq!(refresher.backlog(2), None);

        drop(refresher.begin_drain());
        assert_eq!(refresher.backlog(2), Some(4));
        assert_eq!(refresher.backlog(10), None);
    }
}
