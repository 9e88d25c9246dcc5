//! Reactors
//!
//! A reactor is the machinery behind a derived node. It owns the binding of a
//! reactive function, recomputes when an input fires, and pushes the outcome
//! into the node's output.
//!
//! # Shapes
//!
//! | Shape       | User code returns                      | Module   |
//! |-------------|----------------------------------------|----------|
//! | sync        | `Result<Output, Failure>`              | `sync`   |
//! | future      | a future of the same                   | `future` |
//! | scope       | a [`Scope`]: value plus teardown       | `scope`  |
//! | async scope | an [`AsyncScope`]                      | `scope`  |
//! | stream      | a stream of results                    | `stream` |
//!
//! # Output
//!
//! Every shape ends in the same [`OutputNode`]. A returned [`Output::Value`]
//! becomes the node's value. A returned [`Output::Wrapped`] *redirects* the
//! node: until the next recompute it reads through to that wrapped value and
//! fires whenever it fires. The redirect goes through a small relay observer
//! placed between the target and the node, and the node is pushed below the
//! relay so ordering stays sound.
//!
//! A failure coming out of user code (or out of argument unwrapping) is
//! stored on the node, never raised. Failures that originate here are logged
//! once at `warn`; silent failures and failures inherited from an argument
//! are not.

mod future;
mod scope;
mod stream;
mod sync;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use super::binding::{Binding, Call};
use super::runtime::Runtime;
use super::value::Value;
use super::wrapped::{Node, Wrapped};
use crate::error::{Failure, ReactiveError};
use crate::graph::{NotifierId, Observer, Update};

pub use scope::{AsyncScope, AsyncScoped, Scope, Scoped};

pub(crate) use future::{AsyncFn, FutureReactor};
pub(crate) use scope::{AsyncScopeFn, AsyncScopeReactor, ScopeFn, ScopeReactor};
pub(crate) use stream::{StreamFn, StreamReactor};
pub(crate) use sync::{SyncFn, SyncReactor};

/// What one invocation of a reactive function produced.
#[derive(Clone)]
pub enum Output {
    Value(Value),
    /// Forward another node until the next recompute.
    Wrapped(Wrapped),
}

impl Output {
    pub fn value<T: 'static>(value: T) -> Self {
        Self::Value(Value::new(value))
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Wrapped> for Output {
    fn from(node: Wrapped) -> Self {
        Self::Wrapped(node)
    }
}

pub(crate) fn log_carried(runtime: &Runtime, node: &str, failure: &Failure) {
    if runtime.config().log_carried_failures && failure.should_log() {
        warn!(node, error = %failure, "carrying failure");
    }
}

/// Turn an outcome into a node that never changes.
pub(crate) fn settle_output(
    runtime: &Runtime,
    name: Rc<str>,
    outcome: Result<Output, Failure>,
) -> Wrapped {
    match outcome {
        Ok(Output::Value(value)) => super::wrapped::resolved(name, Ok(value)),
        Ok(Output::Wrapped(node)) => node,
        Err(failure) => {
            log_carried(runtime, &name, &failure);
            super::wrapped::resolved(name, Err(failure))
        }
    }
}

// ---- Output node ----

/// Forwards the notifications of a redirect target to the node.
struct Relay {
    runtime: Runtime,
    id: NotifierId,
    forward_to: NotifierId,
}

impl Relay {
    fn attach(
        runtime: &Runtime,
        target: NotifierId,
        forward_to: NotifierId,
        name: &str,
    ) -> Result<Rc<Self>, ReactiveError> {
        let id = runtime.register(Rc::from(format!("{name}/redirect")), None);
        let relay = Rc::new(Self {
            runtime: runtime.clone(),
            id,
            forward_to,
        });
        let handler = Rc::downgrade(&relay) as Weak<dyn Observer>;
        runtime.set_handler(id, handler);

        runtime.add_observer(target, id)?;
        runtime.raise_priority(forward_to, runtime.priority(id) + 1, id)?;
        Ok(relay)
    }
}

impl Observer for Relay {
    fn update(self: Rc<Self>) -> Update {
        self.runtime.notify_observers(self.forward_to);
        Update::Ready(Ok(false))
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

struct Redirect {
    target: Wrapped,
    _relay: Option<Rc<Relay>>,
}

/// The readable side of a derived node.
pub(crate) struct OutputNode {
    runtime: Runtime,
    id: NotifierId,
    name: Rc<str>,
    result: RefCell<Result<Value, Failure>>,
    redirect: RefCell<Option<Redirect>>,
}

impl OutputNode {
    fn new(runtime: Runtime, id: NotifierId, name: Rc<str>) -> Self {
        Self {
            runtime,
            id,
            name,
            result: RefCell::new(Err(Failure::not_initialized())),
            redirect: RefCell::new(None),
        }
    }

    pub(crate) fn inner(&self) -> Result<Value, Failure> {
        let target = self
            .redirect
            .borrow()
            .as_ref()
            .map(|redirect| redirect.target.clone());
        match target {
            Some(target) => target.inner(),
            None => self.result.borrow().clone(),
        }
    }

    /// Store the outcome of one invocation.
    pub(crate) fn provide(&self, outcome: Result<Output, Failure>) -> Result<(), ReactiveError> {
        match outcome {
            Ok(Output::Value(value)) => self.store(Ok(value)),
            Ok(Output::Wrapped(target)) => self.redirect_to(target)?,
            Err(failure) => {
                log_carried(&self.runtime, &self.name, &failure);
                self.store(Err(failure));
            }
        }
        Ok(())
    }

    fn store(&self, result: Result<Value, Failure>) {
        *self.result.borrow_mut() = result;
        let previous = self.redirect.borrow_mut().take();
        drop(previous);
    }

    fn redirect_to(&self, target: Wrapped) -> Result<(), ReactiveError> {
        let unchanged = self
            .redirect
            .borrow()
            .as_ref()
            .is_some_and(|redirect| redirect.target.ptr_eq(&target));
        if unchanged {
            return Ok(());
        }

        if let Some(owner) = target.runtime() {
            if !owner.same(&self.runtime) {
                return Err(ReactiveError::ForeignNode {
                    node: target.name().to_string(),
                });
            }
        }
        let relay = match target.notifier() {
            Some(source) => Some(Relay::attach(&self.runtime, source, self.id, &self.name)?),
            None => None,
        };

        let previous = self.redirect.borrow_mut().replace(Redirect {
            target,
            _relay: relay,
        });
        drop(previous);
        Ok(())
    }

    /// Drop a redirect, keeping the last stored value.
    pub(crate) fn detach(&self) {
        let previous = self.redirect.borrow_mut().take();
        drop(previous);
    }

    pub(crate) fn notify(&self) {
        self.runtime.notify_observers(self.id);
    }
}

impl Drop for OutputNode {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

// ---- Reactor plumbing ----

/// State every reactor shape shares.
pub(crate) struct ReactorCore {
    pub(crate) runtime: Runtime,
    pub(crate) id: NotifierId,
    pub(crate) name: Rc<str>,
    binding: Binding,
    output: Weak<OutputNode>,
    disposed: Cell<bool>,
}

impl ReactorCore {
    /// The output, unless the node was disposed or dropped.
    pub(crate) fn output(&self) -> Option<Rc<OutputNode>> {
        if self.disposed.get() {
            return None;
        }
        self.output.upgrade()
    }

    pub(crate) fn output_ref(&self) -> Weak<OutputNode> {
        self.output.clone()
    }

    pub(crate) fn arguments(&self) -> Result<Call, Failure> {
        self.binding.rewrap()
    }

    /// Returns `true` the first time only.
    pub(crate) fn mark_disposed(&self) -> bool {
        if self.disposed.replace(true) {
            return false;
        }
        if let Some(output) = self.output.upgrade() {
            output.detach();
        }
        true
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn priority(&self) -> u32 {
        self.runtime.priority(self.id)
    }
}

/// A reactor shape.
pub(crate) trait Reactor: Observer + 'static {
    /// Read the node. Shapes that defer work override this.
    fn read(&self, output: &OutputNode) -> Result<Value, Failure> {
        output.inner()
    }

    /// Release held resources. Must be idempotent.
    fn dispose(&self);
}

/// Register the notifier, wire the reactor to it and observe the inputs.
pub(crate) fn assemble<R, F>(
    runtime: &Runtime,
    binding: Binding,
    make: F,
) -> Result<(Rc<OutputNode>, Rc<R>), ReactiveError>
where
    R: Reactor,
    F: FnOnce(ReactorCore) -> R,
{
    let name: Rc<str> = Rc::from(binding.function());
    let id = runtime.register(name.clone(), None);
    let output = Rc::new(OutputNode::new(runtime.clone(), id, name.clone()));
    let inputs: Vec<Wrapped> = binding.observed().cloned().collect();

    let reactor = Rc::new(make(ReactorCore {
        runtime: runtime.clone(),
        id,
        name,
        binding,
        output: Rc::downgrade(&output),
        disposed: Cell::new(false),
    }));
    let handler = Rc::downgrade(&reactor) as Weak<dyn Observer>;
    runtime.set_handler(id, handler);

    for input in &inputs {
        runtime.observe(input, id)?;
    }
    Ok((output, reactor))
}

/// The node handed out to callers. Dropping it disposes the reactor.
struct ReactiveNode<R: Reactor> {
    output: Rc<OutputNode>,
    reactor: Rc<R>,
}

impl<R: Reactor> Node for ReactiveNode<R> {
    fn name(&self) -> &str {
        &self.output.name
    }

    fn notifier(&self) -> Option<NotifierId> {
        Some(self.output.id)
    }

    fn inner(&self) -> Result<Value, Failure> {
        self.reactor.read(&self.output)
    }

    fn runtime(&self) -> Option<&Runtime> {
        Some(&self.output.runtime)
    }

    fn dispose(&self) {
        self.reactor.dispose();
    }
}

impl<R: Reactor> Drop for ReactiveNode<R> {
    fn drop(&mut self) {
        self.reactor.dispose();
    }
}

pub(crate) fn finish<R: Reactor>(output: Rc<OutputNode>, reactor: Rc<R>) -> Wrapped {
    Wrapped::from_node(Rc::new(ReactiveNode { output, reactor }))
}
