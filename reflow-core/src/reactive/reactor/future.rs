//! Future reactor: the user function returns a future.
//!
//! Updates of one node never overlap. A second update that arrives while the
//! first is still awaiting waits for it on the node's lock and then runs with
//! the newest argument values.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

use super::{assemble, finish, Output, Reactor, ReactorCore};
use crate::error::{Failure, ReactiveError};
use crate::graph::{Observer, Update};
use crate::reactive::binding::{Binding, Call};
use crate::reactive::runtime::Runtime;
use crate::reactive::wrapped::Wrapped;

pub(crate) type AsyncFn = Rc<dyn Fn(Call) -> LocalBoxFuture<'static, Result<Output, Failure>>>;

pub(crate) struct FutureReactor {
    core: ReactorCore,
    func: AsyncFn,
    serial: Mutex<()>,
}

impl FutureReactor {
    pub(crate) async fn build(
        runtime: &Runtime,
        binding: Binding,
        func: AsyncFn,
    ) -> Result<Wrapped, ReactiveError> {
        let (output, reactor) = assemble(runtime, binding, |core| Self {
            core,
            func,
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

        debug!(node = %self.core.name, "recomputing");
        let outcome = match self.core.arguments() {
            Ok(call) => (self.func)(call).await,
            Err(failure) => Err(failure),
        };

        // The node may have gone away while we were waiting.
        let Some(output) = self.core.output() else {
            return Ok(false);
        };
        output.provide(outcome)?;
        Ok(true)
    }
}

impl Observer for FutureReactor {
    fn update(self: Rc<Self>) -> Update {
        Update::pending(self.recompute())
    }
}

impl Reactor for FutureReactor {
    fn dispose(&self) {
        self.core.mark_disposed();
    }
}
