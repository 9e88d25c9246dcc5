//! Scope reactors: values that own a resource.
//!
//! The user function returns a scope instead of a value. Entering the scope
//! yields the node's value; exiting it releases whatever was acquired. The
//! reactor guarantees that at most one scope per node is open at any time:
//! before recomputing it exits the previous scope, and disposal exits the
//! open one. N builds therefore produce exactly N exits by the time the node
//! is disposed.
//!
//! A failing exit is logged and otherwise ignored.

use std::cell::RefCell;
use std::future::Future;
use std::mem;
use std::rc::Rc;

use futures_util::future::{self, LocalBoxFuture};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{assemble, finish, Output, Reactor, ReactorCore};
use crate::error::{Failure, ReactiveError};
use crate::graph::{Observer, Update};
use crate::reactive::binding::{Binding, Call};
use crate::reactive::runtime::Runtime;
use crate::reactive::wrapped::Wrapped;

/// A resource-owning computation with a synchronous teardown.
pub trait Scope {
    /// Produce the value. Called exactly once per scope.
    fn enter(&mut self) -> Result<Output, Failure>;

    /// Release the resource. Called at most once, after `enter` succeeded.
    fn exit(self: Box<Self>) -> Result<(), Failure>;
}

/// A resource-owning computation with an asynchronous setup and teardown.
pub trait AsyncScope {
    fn enter(&mut self) -> LocalBoxFuture<'_, Result<Output, Failure>>;

    fn exit(self: Box<Self>) -> LocalBoxFuture<'static, Result<(), Failure>>;
}

type ExitFn = Box<dyn FnOnce() -> Result<(), Failure>>;

/// A [`Scope`] made of a value and a teardown closure.
///
/// The resource is acquired by the reactive function before it returns the
/// `Scoped`; the closure releases it.
pub struct Scoped {
    value: Option<Output>,
    exit: ExitFn,
}

impl Scoped {
    pub fn new<F>(value: impl Into<Output>, exit: F) -> Self
    where
        F: FnOnce() -> Result<(), Failure> + 'static,
    {
        Self {
            value: Some(value.into()),
            exit: Box::new(exit),
        }
    }
}

impl Scope for Scoped {
    fn enter(&mut self) -> Result<Output, Failure> {
        self.value
            .take()
            .ok_or_else(|| Failure::msg("scope was entered twice"))
    }

    fn exit(self: Box<Self>) -> Result<(), Failure> {
        let this = *self;
        (this.exit)()
    }
}

type EnterFuture<R> = LocalBoxFuture<'static, Result<(Output, R), Failure>>;
type AsyncExitFn<R> = Box<dyn FnOnce(R) -> LocalBoxFuture<'static, Result<(), Failure>>>;

/// An [`AsyncScope`] made of an acquiring future and a releasing closure.
///
/// The enter future resolves to the node's value together with the resource
/// `R`, which the exit closure later receives.
pub struct AsyncScoped<R> {
    enter: Option<EnterFuture<R>>,
    resource: Option<R>,
    exit: AsyncExitFn<R>,
}

impl<R: 'static> AsyncScoped<R> {
    pub fn new<E, X, XF>(enter: E, exit: X) -> Self
    where
        E: Future<Output = Result<(Output, R), Failure>> + 'static,
        X: FnOnce(R) -> XF + 'static,
        XF: Future<Output = Result<(), Failure>> + 'static,
    {
        Self {
            enter: Some(enter.boxed_local()),
            resource: None,
            exit: Box::new(move |resource| exit(resource).boxed_local()),
        }
    }
}

impl<R: 'static> AsyncScoped<R> {
    async fn acquire(&mut self) -> Result<Output, Failure> {
        let enter = self
            .enter
            .take()
            .ok_or_else(|| Failure::msg("scope was entered twice"))?;
        let (value, resource) = enter.await?;
        self.resource = Some(resource);
        Ok(value)
    }
}

impl<R: 'static> AsyncScope for AsyncScoped<R> {
    fn enter(&mut self) -> LocalBoxFuture<'_, Result<Output, Failure>> {
        self.acquire().boxed_local()
    }

    fn exit(self: Box<Self>) -> LocalBoxFuture<'static, Result<(), Failure>> {
        let this = *self;
        match this.resource {
            Some(resource) => (this.exit)(resource),
            None => future::ready(Ok(())).boxed_local(),
        }
    }
}

/// Lifecycle of the scope a node currently holds.
pub(crate) enum ScopeState<S> {
    Unbuilt,
    Built(S),
    Disposed,
}

impl<S> Default for ScopeState<S> {
    fn default() -> Self {
        Self::Unbuilt
    }
}

impl<S> ScopeState<S> {
    /// Take the open scope so it can be exited before the next build.
    pub(crate) fn take_open(&mut self) -> Option<S> {
        match mem::take(self) {
            Self::Built(scope) => Some(scope),
            Self::Disposed => {
                *self = Self::Disposed;
                None
            }
            Self::Unbuilt => None,
        }
    }

    /// Record a freshly entered scope.
    ///
    /// After disposal the scope is handed back: the caller must exit it.
    pub(crate) fn open(&mut self, scope: S, function: &str) -> Result<Option<S>, ReactiveError> {
        match self {
            Self::Built(_) => Err(ReactiveError::ScopeStillOpen {
                function: function.to_string(),
            }),
            Self::Disposed => Ok(Some(scope)),
            Self::Unbuilt => {
                *self = Self::Built(scope);
                Ok(None)
            }
        }
    }

    /// Move to the terminal state, returning the scope still open, if any.
    pub(crate) fn dispose(&mut self) -> Option<S> {
        match mem::replace(self, Self::Disposed) {
            Self::Built(scope) => Some(scope),
            _ => None,
        }
    }
}

fn close(node: &str, scope: Box<dyn Scope>) {
    if let Err(failure) = scope.exit() {
        error!(node, error = %failure, "ignoring failure in scope cleanup");
    }
}

async fn close_async(node: Rc<str>, scope: Box<dyn AsyncScope>) {
    if let Err(failure) = scope.exit().await {
        error!(node = %node, error = %failure, "ignoring failure in scope cleanup");
    }
}

// ---- Sync scope ----

pub(crate) type ScopeFn = Rc<dyn Fn(&Call) -> Result<Box<dyn Scope>, Failure>>;

pub(crate) struct ScopeReactor {
    core: ReactorCore,
    factory: ScopeFn,
    state: RefCell<ScopeState<Box<dyn Scope>>>,
}

impl ScopeReactor {
    pub(crate) fn build(
        runtime: &Runtime,
        binding: Binding,
        factory: ScopeFn,
    ) -> Result<Wrapped, ReactiveError> {
        let (output, reactor) = assemble(runtime, binding, |core| Self {
            core,
            factory,
            state: Default::default(),
        })?;
        reactor.recompute()?;
        Ok(finish(output, reactor))
    }

    fn recompute(&self) -> Result<bool, ReactiveError> {
        let Some(output) = self.core.output() else {
            return Ok(false);
        };

        let previous = self.state.borrow_mut().take_open();
        if let Some(previous) = previous {
            close(&self.core.name, previous);
        }

        debug!(node = %self.core.name, "entering scope");
        let outcome = match self.core.arguments().and_then(|call| (self.factory)(&call)) {
            Ok(mut scope) => {
                let entered = scope.enter();
                if entered.is_ok() {
                    let rejected = self.state.borrow_mut().open(scope, &self.core.name)?;
                    if let Some(rejected) = rejected {
                        close(&self.core.name, rejected);
                    }
                }
                entered
            }
            Err(failure) => Err(failure),
        };
        output.provide(outcome)?;
        Ok(true)
    }
}

impl Observer for ScopeReactor {
    fn update(self: Rc<Self>) -> Update {
        Update::Ready(self.recompute())
    }
}

impl Reactor for ScopeReactor {
    fn dispose(&self) {
        let open = self.state.borrow_mut().dispose();
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(scope) = open {
            let node = self.core.name.clone();
            self.core.runtime.schedule_cleanup(
                self.core.priority(),
                Box::new(move || async move { close(&node, scope) }.boxed_local()),
            );
        }
    }
}

// ---- Async scope ----

pub(crate) type AsyncScopeFn = Rc<dyn Fn(Call) -> Result<Box<dyn AsyncScope>, Failure>>;

pub(crate) struct AsyncScopeReactor {
    core: ReactorCore,
    factory: AsyncScopeFn,
    state: RefCell<ScopeState<Box<dyn AsyncScope>>>,
    serial: Mutex<()>,
}

impl AsyncScopeReactor {
    pub(crate) async fn build(
        runtime: &Runtime,
        binding: Binding,
        factory: AsyncScopeFn,
    ) -> Result<Wrapped, ReactiveError> {
        let (output, reactor) = assemble(runtime, binding, |core| Self {
            core,
            factory,
            state: Default::default(),
            serial: Mutex::new(()),
        })?;
        reactor.clone().recompute().await?;
        Ok(finish(output, reactor))
    }

    async fn recompute(self: Rc<Self>) -> Result<bool, ReactiveError> {
        let _serial = self.serial.lock().await;
        if self.core.output().is_none() {
            return Ok(false);
        }

        let previous = self.state.borrow_mut().take_open();
        if let Some(previous) = previous {
            close_async(self.core.name.clone(), previous).await;
        }

        debug!(node = %self.core.name, "entering scope");
        let outcome = match self.core.arguments().and_then(|call| (self.factory)(call)) {
            Ok(mut scope) => {
                let entered = scope.enter().await;
                if entered.is_ok() {
                    let rejected = self.state.borrow_mut().open(scope, &self.core.name)?;
                    if let Some(rejected) = rejected {
                        close_async(self.core.name.clone(), rejected).await;
                    }
                }
                entered
            }
            Err(failure) => Err(failure),
        };

        let Some(output) = self.core.output() else {
            return Ok(false);
        };
        output.provide(outcome)?;
        Ok(true)
    }
}

impl Observer for AsyncScopeReactor {
    fn update(self: Rc<Self>) -> Update {
        Update::pending(self.recompute())
    }
}

impl Reactor for AsyncScopeReactor {
    fn dispose(&self) {
        let open = self.state.borrow_mut().dispose();
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(scope) = open {
            let node = self.core.name.clone();
            self.core.runtime.schedule_cleanup(
                self.core.priority(),
                Box::new(move || close_async(node, scope).boxed_local()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn state_machine_holds_one_scope() {
        let mut state = ScopeState::default();
        assert!(state.take_open().is_none());

        assert!(state.open(1, "f").unwrap().is_none());
        assert!(matches!(state, ScopeState::Built(1)));

        let err = state.open(2, "f").unwrap_err();
        assert!(matches!(err, ReactiveError::ScopeStillOpen { .. }));

        assert_eq!(state.take_open(), Some(1));
        assert!(state.open(3, "f").unwrap().is_none());
        assert_eq!(state.dispose(), Some(3));
    }

    #[test]
    fn disposed_state_rejects_new_scopes() {
        let mut state = ScopeState::default();
        state.open(1, "f").unwrap();
        assert_eq!(state.dispose(), Some(1));
        assert_eq!(state.dispose(), None);

        // A scope finishing after disposal is handed back for exit.
        assert_eq!(state.open(2, "f").unwrap(), Some(2));
        assert!(state.take_open().is_none());
        assert!(matches!(state, ScopeState::Disposed));
    }

    #[test]
    fn scoped_yields_once_and_runs_exit() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();
        let mut scope = Scoped::new(Output::value(5), move || {
            flag.set(true);
            Ok(())
        });

        assert!(scope.enter().is_ok());
        assert!(scope.enter().is_err());
        Box::new(scope).exit().unwrap();
        assert!(released.get());
    }

    #[test]
    fn async_scoped_hands_resource_to_exit() {
        let released = Rc::new(Cell::new(0));
        let seen = released.clone();
        let mut scope = AsyncScoped::new(async { Ok((Output::value("conn"), 7u32)) }, move |id| {
            seen.set(id);
            future::ready(Ok(()))
        });

        let value = scope.enter().now_or_never().unwrap().unwrap();
        assert!(matches!(value, Output::Value(_)));
        Box::new(scope).exit().now_or_never().unwrap().unwrap();
        assert_eq!(released.get(), 7);
    }

    #[test]
    fn async_scoped_without_enter_skips_exit() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();
        let scope = AsyncScoped::new(async { Ok((Output::value(()), ())) }, move |_| {
            flag.set(true);
            future::ready(Ok(()))
        });

        Box::new(scope).exit().now_or_never().unwrap().unwrap();
        assert!(!released.get());
    }
}
