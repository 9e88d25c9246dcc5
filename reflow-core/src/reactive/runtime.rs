//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, derived nodes
//! and proxies. It owns the notifier graph and the refresher queue, and it
//! runs the task that drains the queue.
//!
//! # How It Works
//!
//! 1. Every node registers a notifier with the runtime it was created on.
//!
//! 2. Building a derived node registers it as an observer of its wrapped
//!    inputs, which places it one level below the deepest of them.
//!
//! 3. When a cell changes, the runtime queues every live observer of the
//!    cell at its priority. Nothing runs yet.
//!
//! 4. A *drainer* pops observers lowest priority first, runs their update
//!    and, when an update reports a change, queues *its* observers. Only one
//!    drainer is active at a time; the others wait for it.
//!
//! # Driving
//!
//! Writes, drops and disposals only queue work, so they are safe anywhere,
//! including outside of any tokio context. The queue is drained by:
//!
//! - [`Runtime::settle`], which drains inline and returns once idle;
//! - [`Runtime::drive`], a long-running loop a host spawns on its event
//!   loop to propagate changes as they happen;
//! - a stream node's task, which starts a drain after every item it stores.
//!
//! A drainer that is dropped halfway (its event loop went away) leaves the
//! rest of the queue for the next one.
//!
//! # Threading
//!
//! A runtime is a cheap `Rc` handle and is not `Send`. Stream nodes spawn
//! their task with [`tokio::task::spawn_local`] and therefore need a tokio
//! [`LocalSet`]; [`run_local`] sets one up for you.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing::{debug, error, warn};

use super::cell::Cell;
use super::value::Value;
use super::wrapped::Wrapped;
use crate::config::RuntimeConfig;
use crate::error::{Failure, ReactiveError};
use crate::graph::{
    Cleanup, DrainGuard, Job, NotifierGraph, NotifierId, NotifierStats, Observer, Refresher, RefresherStats,
};

struct RuntimeInner {
    config: RuntimeConfig,
    notifiers: RefCell<NotifierGraph>,
    refresher: Refresher,
    /// Poked on every enqueue; [`Runtime::drive`] sleeps on it.
    wake: Notify,
}

/// Handle to one reactive graph.
///
/// Cloning is cheap; all clones share the same graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(runtime = %config.name, "creating runtime");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                notifiers: RefCell::new(NotifierGraph::new()),
                refresher: Refresher::new(),
                wake: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether both handles point at the same graph.
    pub fn same(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a writable cell holding `value`.
    pub fn cell<T: 'static>(&self, value: T) -> Cell {
        Cell::new(self, "cell", Ok(Value::new(value)))
    }

    /// Create a writable cell with a name used in logs and diagnostics.
    pub fn named_cell<T: 'static>(&self, name: &str, value: T) -> Cell {
        Cell::new(self, name, Ok(Value::new(value)))
    }

    /// Create a cell with no value yet. Reading it fails with
    /// [`ReactiveError::NotInitialized`] until something is set.
    pub fn cell_uninit(&self) -> Cell {
        Cell::new(self, "cell", Err(Failure::not_initialized()))
    }

    // ---- Graph plumbing used by the node implementations ----

    pub(crate) fn register(&self, name: Rc<str>, handler: Option<Weak<dyn Observer>>) -> NotifierId {
        self.inner.notifiers.borrow_mut().insert(name, handler)
    }

    pub(crate) fn set_handler(&self, id: NotifierId, handler: Weak<dyn Observer>) {
        self.inner.notifiers.borrow_mut().set_handler(id, handler);
    }

    pub(crate) fn unregister(&self, id: NotifierId) {
        self.inner.notifiers.borrow_mut().remove(id);
    }

    pub(crate) fn priority(&self, id: NotifierId) -> u32 {
        self.inner.notifiers.borrow().priority(id).unwrap_or(0)
    }

    pub(crate) fn add_observer(
        &self,
        source: NotifierId,
        observer: NotifierId,
    ) -> Result<(), ReactiveError> {
        self.inner.notifiers.borrow_mut().add_observer(source, observer)
    }

    pub(crate) fn remove_observer(&self, source: NotifierId, observer: NotifierId) {
        self.inner.notifiers.borrow_mut().remove_observer(source, observer);
    }

    pub(crate) fn raise_priority(
        &self,
        id: NotifierId,
        at_least: u32,
        guard: NotifierId,
    ) -> Result<(), ReactiveError> {
        self.inner
            .notifiers
            .borrow_mut()
            .raise_priority(id, at_least, guard)
    }

    /// Register `observer` on the notifier of `source`.
    ///
    /// Constants never fire, so observing one is a no-op.
    pub(crate) fn observe(&self, source: &Wrapped, observer: NotifierId) -> Result<(), ReactiveError> {
        if let Some(owner) = source.runtime() {
            if !owner.same(self) {
                return Err(ReactiveError::ForeignNode {
                    node: source.name().to_string(),
                });
            }
        }
        match source.notifier() {
            Some(id) => self.add_observer(id, observer),
            None => Ok(()),
        }
    }

    pub(crate) fn unobserve(&self, source: &Wrapped, observer: NotifierId) {
        if let Some(id) = source.notifier() {
            self.remove_observer(id, observer);
        }
    }

    /// Queue every live observer of `source`.
    pub(crate) fn notify_observers(&self, source: NotifierId) {
        let observers = self.inner.notifiers.borrow_mut().fire(source);
        if observers.is_empty() {
            return;
        }
        for (priority, observer) in observers {
            self.inner.refresher.schedule(priority, observer);
        }
        self.queued();
    }

    /// Queue a cleanup at `priority`.
    pub(crate) fn schedule_cleanup(&self, priority: u32, cleanup: Cleanup) {
        self.inner.refresher.schedule_cleanup(priority, cleanup);
        self.queued();
    }

    fn queued(&self) {
        if let Some(pending) = self.inner.refresher.backlog(self.inner.config.warn_queue_len) {
            warn!(runtime = %self.inner.config.name, pending, "refresher queue is growing");
        }
        self.inner.wake.notify_one();
    }

    /// Start a drain on the current [`LocalSet`] unless one is running.
    ///
    /// Only for code that already runs as a local task.
    pub(crate) fn spawn_drain(&self) {
        if self.inner.refresher.is_draining() || self.inner.refresher.pending() == 0 {
            return;
        }
        let runtime = self.clone();
        tokio::task::spawn_local(async move {
            if let Some(guard) = runtime.inner.refresher.begin_drain() {
                runtime.drain(guard).await;
            }
        });
    }

    async fn drain(&self, _guard: DrainGuard<'_>) {
        debug!(runtime = %self.inner.config.name, "refresher started");
        loop {
            let job = {
                let notifiers = self.inner.notifiers.borrow();
                self.inner.refresher.next_job(|id| notifiers.priority(id))
            };
            match job {
                Some(Job::Notify(id)) => self.service(id).await,
                Some(Job::Cleanup(cleanup)) => cleanup().await,
                None => break,
            }
        }
        debug!(runtime = %self.inner.config.name, "refresher idle");
    }

    async fn service(&self, id: NotifierId) {
        let handler = self.inner.notifiers.borrow().handler(id);
        // The observer was dropped after it got queued.
        let Some(handler) = handler else {
            return;
        };

        let outcome = handler.update().resolve().await;
        self.inner
            .notifiers
            .borrow_mut()
            .record_update(id, outcome.as_ref().err().map(ToString::to_string));

        match outcome {
            Ok(true) => self.notify_observers(id),
            Ok(false) => {}
            Err(error) => {
                let node = self.inner.notifiers.borrow().name(id);
                error!(
                    node = node.as_deref().unwrap_or("<dropped>"),
                    error = %error,
                    "ignoring error while updating observer"
                );
            }
        }
    }

    // ---- Public diagnostics ----

    /// Run every queued update and cleanup, including the ones they queue.
    ///
    /// Drains inline when nobody else is draining, otherwise waits for the
    /// active drainer and takes over if it goes away with work left. Works on
    /// any executor. Background stream tasks are not waited for: they queue
    /// work only when they produce an item.
    pub async fn settle(&self) {
        let refresher = &self.inner.refresher;
        loop {
            let released = refresher.released();
            if refresher.is_idle() {
                return;
            }
            match refresher.begin_drain() {
                Some(guard) => self.drain(guard).await,
                None => released.await,
            }
        }
    }

    /// Propagate changes as they are queued, forever.
    ///
    /// Meant to be spawned once on the host's event loop, for example with
    /// `tokio::task::spawn_local(runtime.clone().drive())`. Cancelling it is
    /// harmless: queued work stays queued for the next drainer.
    pub async fn drive(self) {
        loop {
            self.settle().await;
            self.inner.wake.notified().await;
        }
    }

    /// Number of queued entries, duplicates included.
    pub fn pending(&self) -> usize {
        self.inner.refresher.pending()
    }

    /// Number of live notifiers in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.notifiers.borrow().len()
    }

    /// Diagnostics for the notifier of `node`. Constants have none.
    pub fn stats(&self, node: &Wrapped) -> Option<NotifierStats> {
        let id = node.notifier()?;
        self.inner.notifiers.borrow().stats(id)
    }

    pub fn refresher_stats(&self) -> RefresherStats {
        self.inner.refresher.stats()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.inner.config.name)
            .field("nodes", &self.node_count())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Run `future` to completion on a fresh current-thread tokio runtime inside
/// a [`LocalSet`], so stream nodes can spawn their tasks.
pub fn run_local<F: Future>(future: F) -> std::io::Result<F::Output> {
    let tokio = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    Ok(tokio.block_on(local.run_until(future)))
}

// ---- Tests ----
