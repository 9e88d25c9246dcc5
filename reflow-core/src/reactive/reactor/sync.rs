//! Synchronous reactor: recompute inline, eagerly or on read.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use super::{assemble, finish, Output, OutputNode, Reactor, ReactorCore};
use crate::error::{Failure, ReactiveError};
use crate::graph::{Observer, Update};
use crate::reactive::binding::{Binding, Call};
use crate::reactive::runtime::Runtime;
use crate::reactive::value::Value;
use crate::reactive::wrapped::Wrapped;

pub(crate) type SyncFn = Rc<dyn Fn(&Call) -> Result<Output, Failure>>;

pub(crate) struct SyncReactor {
    core: ReactorCore,
    func: SyncFn,
    lazy: bool,
    dirty: Cell<bool>,
}

impl SyncReactor {
    /// Build a node. Eager nodes compute once before returning; lazy ones
    /// start dirty and compute on first read.
    pub(crate) fn build(
        runtime: &Runtime,
        binding: Binding,
        func: SyncFn,
        lazy: bool,
    ) -> Result<Wrapped, ReactiveError> {
        let (output, reactor) = assemble(runtime, binding, |core| Self {
            core,
            func,
            lazy,
            dirty: Cell::new(lazy),
        })?;
        if !lazy {
            reactor.recompute()?;
        }
        Ok(finish(output, reactor))
    }

    fn recompute(&self) -> Result<bool, ReactiveError> {
        let Some(output) = self.core.output() else {
            return Ok(false);
        };
        debug!(node = %self.core.name, "recomputing");
        let outcome = self
            .core
            .arguments()
            .and_then(|call| (self.func)(&call));
        output.provide(outcome)?;
        Ok(true)
    }
}

impl Observer for SyncReactor {
    fn update(self: Rc<Self>) -> Update {
        if !self.lazy {
            return Update::Ready(self.recompute());
        }
        if self.core.is_disposed() {
            return Update::Ready(Ok(false));
        }
        self.dirty.set(true);
        Update::Ready(Ok(true))
    }
}

impl Reactor for SyncReactor {
    fn read(&self, output: &OutputNode) -> Result<Value, Failure> {
        if self.dirty.replace(false) {
            self.recompute()?;
        }
        output.inner()
    }

    fn dispose(&self) {
        self.core.mark_disposed();
    }
}
