//! Notification Graph
//!
//! This module implements the low-level machinery that tracks who observes
//! whom and in which order observers get updated.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Notifiers are the nodes. Every cell, derived value and proxy owns one.
//! - An edge from A to B means "B observes A": when A fires, B's update is
//!   queued.
//!
//! Each notifier carries a priority equal to its depth. The [`Refresher`]
//! drains queued updates lowest priority first, so by the time a node
//! recomputes every ancestor that was queued alongside it has already done so.
//!
//! # Design Decisions
//!
//! 1. Notifiers live in a generational arena ([`NotifierGraph`]) rather than
//!    holding pointers to each other. Edges are plain ids, and dropping a node
//!    frees its slot. Stale edges are pruned lazily when their source fires.
//!
//! 2. Observers are kept in an insertion-ordered set, so notification order
//!    among siblings is deterministic.
//!
//! 3. The graph is single-threaded. Everything lives behind `RefCell`s owned
//!    by one runtime and no borrow is held across user code.

mod notifier;
mod observer;
mod refresher;

pub use notifier::{NotifierGraph, NotifierId, NotifierStats};
pub use observer::{FnObserver, Observer, Update, UpdateResult};
pub use refresher::{Cleanup, DrainGuard, Job, Refresher, RefresherStats};
