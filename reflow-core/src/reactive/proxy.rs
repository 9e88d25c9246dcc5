//! Proxies
//!
//! A proxy stands in for another node (its *target*) and decides how
//! eagerly the target gets evaluated when it changes.
//!
//! # Variants
//!
//! - [`Forwarding`]: reads through to the target and fires when it fires.
//!   The target can be swapped at any time with [`Forwarding::switch_to`].
//! - [`lazy`]: marks itself dirty on change and reads the target only when
//!   the proxy itself is read. A lazy target behind it stays unevaluated.
//! - [`volatile`]: reads the target on every change, which forces lazy
//!   targets to recompute immediately. Use it for nodes that exist for their
//!   side effects. Failures surfaced this way are logged.
//! - [`VisibilityGated`]: volatile while a predicate holds (e.g. "the widget
//!   is on screen"), lazy otherwise. Call [`VisibilityGated::refresh`] when
//!   the predicate may have flipped.
//!
//! All proxies are read-only: [`Wrapped::try_set`] on one fails with
//! [`ReactiveError::ReadOnly`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use super::runtime::Runtime;
use super::value::Value;
use super::wrapped::{Node, Wrapped};
use crate::error::{Failure, ReactiveError};
use crate::graph::{NotifierId, Observer, Update};

type Predicate = Rc<dyn Fn() -> bool>;

enum Policy {
    Forward,
    Lazy,
    Volatile,
    Gated(Predicate),
}

struct ProxyNode {
    runtime: Runtime,
    id: NotifierId,
    name: Rc<str>,
    policy: Policy,
    target: RefCell<Wrapped>,
    dirty: Cell<bool>,
    cached: RefCell<Option<Result<Value, Failure>>>,
}

impl ProxyNode {
    fn create(
        runtime: &Runtime,
        name: &str,
        target: &Wrapped,
        policy: Policy,
    ) -> Result<Rc<Self>, ReactiveError> {
        let name: Rc<str> = Rc::from(name);
        let id = runtime.register(name.clone(), None);
        let node = Rc::new(Self {
            runtime: runtime.clone(),
            id,
            name,
            policy,
            target: RefCell::new(target.clone()),
            dirty: Cell::new(true),
            cached: RefCell::new(None),
        });
        let handler = Rc::downgrade(&node) as Weak<dyn Observer>;
        runtime.set_handler(id, handler);
        runtime.observe(target, id)?;
        Ok(node)
    }

    fn target(&self) -> Wrapped {
        self.target.borrow().clone()
    }

    /// Read the target for its side effects.
    fn force(&self) {
        self.dirty.set(false);
        if let Err(failure) = self.target().inner() {
            if !failure.is_silent() {
                warn!(node = %self.name, error = %failure, "target failed");
            }
        }
    }

    fn is_visible(&self) -> bool {
        match &self.policy {
            Policy::Gated(visible) => visible(),
            _ => true,
        }
    }

    fn switch_to(&self, target: &Wrapped) -> Result<(), ReactiveError> {
        let previous = self.target();
        if previous.ptr_eq(target) {
            return Ok(());
        }
        self.runtime.observe(target, self.id)?;
        self.runtime.unobserve(&previous, self.id);
        *self.target.borrow_mut() = target.clone();
        self.dirty.set(true);

        self.runtime.notify_observers(self.id);
        Ok(())
    }

    fn as_wrapped(self: &Rc<Self>) -> Wrapped {
        Wrapped::from_node(self.clone())
    }
}

impl Observer for ProxyNode {
    fn update(self: Rc<Self>) -> Update {
        match &self.policy {
            Policy::Forward | Policy::Lazy => self.dirty.set(true),
            Policy::Volatile => self.force(),
            Policy::Gated(_) => {
                if self.is_visible() {
                    self.force();
                } else {
                    self.dirty.set(true);
                }
            }
        }
        Update::Ready(Ok(true))
    }
}

impl Node for ProxyNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier(&self) -> Option<NotifierId> {
        Some(self.id)
    }

    fn inner(&self) -> Result<Value, Failure> {
        if !matches!(self.policy, Policy::Lazy) {
            return self.target().inner();
        }
        if self.dirty.replace(false) {
            let fresh = self.target().inner();
            *self.cached.borrow_mut() = Some(fresh.clone());
            return fresh;
        }
        let cached = self.cached.borrow().clone();
        cached.unwrap_or_else(|| self.target().inner())
    }

    fn runtime(&self) -> Option<&Runtime> {
        Some(&self.runtime)
    }
}

impl Drop for ProxyNode {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

/// A proxy whose target can be switched.
#[derive(Clone)]
pub struct Forwarding {
    node: Rc<ProxyNode>,
}

impl Forwarding {
    pub fn new(runtime: &Runtime, target: &Wrapped) -> Result<Self, ReactiveError> {
        let node = ProxyNode::create(runtime, "forward", target, Policy::Forward)?;
        Ok(Self { node })
    }

    /// Point the proxy at `target` and notify observers.
    ///
    /// Fails with [`ReactiveError::Cycle`] if `target` depends on the proxy.
    pub fn switch_to(&self, target: &Wrapped) -> Result<(), ReactiveError> {
        self.node.switch_to(target)
    }

    pub fn target(&self) -> Wrapped {
        self.node.target()
    }

    pub fn as_wrapped(&self) -> Wrapped {
        self.node.as_wrapped()
    }
}

impl From<&Forwarding> for Wrapped {
    fn from(proxy: &Forwarding) -> Self {
        proxy.as_wrapped()
    }
}

/// A proxy that defers reading `target` until it is read itself.
pub fn lazy(runtime: &Runtime, target: &Wrapped) -> Result<Wrapped, ReactiveError> {
    let node = ProxyNode::create(runtime, "lazy", target, Policy::Lazy)?;
    Ok(node.as_wrapped())
}

/// A proxy that reads `target` right away and after every change.
pub fn volatile(runtime: &Runtime, target: &Wrapped) -> Result<Wrapped, ReactiveError> {
    let node = ProxyNode::create(runtime, "volatile", target, Policy::Volatile)?;
    node.force();
    Ok(node.as_wrapped())
}

/// A proxy that is volatile only while `visible` returns `true`.
#[derive(Clone)]
pub struct VisibilityGated {
    node: Rc<ProxyNode>,
}

impl VisibilityGated {
    pub fn new<F>(runtime: &Runtime, target: &Wrapped, visible: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> bool + 'static,
    {
        let node = ProxyNode::create(runtime, "gated", target, Policy::Gated(Rc::new(visible)))?;
        if node.is_visible() {
            node.force();
        }
        Ok(Self { node })
    }

    /// Catch up on a change missed while hidden, if visible now.
    ///
    /// Returns whether the target was read.
    pub fn refresh(&self) -> bool {
        if self.node.dirty.get() && self.node.is_visible() {
            self.node.force();
            return true;
        }
        false
    }

    /// Whether a change arrived while hidden and was not caught up on yet.
    pub fn is_stale(&self) -> bool {
        self.node.dirty.get()
    }

    pub fn as_wrapped(&self) -> Wrapped {
        self.node.as_wrapped()
    }
}

pub fn visibility_gated<F>(
    runtime: &Runtime,
    target: &Wrapped,
    visible: F,
) -> Result<VisibilityGated, ReactiveError>
where
    F: Fn() -> bool + 'static,
{
    VisibilityGated::new(runtime, target, visible)
}

// ---- Tests ----
