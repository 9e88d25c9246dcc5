//! Stream reactor: a background task feeding the node.
//!
//! The user function returns a stream. A local task pulls items from it and
//! every item replaces the node's value and notifies its observers. The task
//! then starts a drain, so observers catch up without anyone settling. When
//! the inputs change, the running task is aborted and awaited before a new
//! stream is started. Disposal does the same through the refresher.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures_util::stream::LocalBoxStream;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{assemble, finish, Output, OutputNode, Reactor, ReactorCore};
use crate::error::{Failure, ReactiveError};
use crate::graph::{Observer, Update};
use crate::reactive::binding::{Binding, Call};
use crate::reactive::runtime::Runtime;
use crate::reactive::wrapped::Wrapped;

pub(crate) type StreamFn = Rc<dyn Fn(Call) -> LocalBoxStream<'static, Result<Output, Failure>>>;

pub(crate) struct StreamReactor {
    core: ReactorCore,
    func: StreamFn,
    task: RefCell<Option<JoinHandle<()>>>,
    serial: Mutex<()>,
}

impl StreamReactor {
    pub(crate) async fn build(
        runtime: &Runtime,
        binding: Binding,
        func: StreamFn,
    ) -> Result<Wrapped, ReactiveError> {
        let (output, reactor) = assemble(runtime, binding, |core| Self {
            core,
            func,
            task: RefCell::new(None),
            serial: Mutex::new(()),
        })?;
        reactor.clone().restart().await?;
        Ok(finish(output, reactor))
    }

    async fn restart(self: Rc<Self>) -> Result<bool, ReactiveError> {
        let _serial = self.serial.lock().await;

        let previous = self.task.borrow_mut().take();
        cancel(&self.core.name, previous).await;

        let Some(output) = self.core.output() else {
            return Ok(false);
        };
        match self.core.arguments() {
            Ok(call) => {
                debug!(node = %self.core.name, "starting stream");
                let stream = (self.func)(call);
                let task = tokio::task::spawn_local(pump(self.core.output_ref(), stream));
                *self.task.borrow_mut() = Some(task);
                // Nothing changed yet; the task notifies per item.
                Ok(false)
            }
            Err(failure) => {
                output.provide(Err(failure))?;
                Ok(true)
            }
        }
    }
}

async fn pump(output: Weak<OutputNode>, mut stream: LocalBoxStream<'static, Result<Output, Failure>>) {
    while let Some(item) = stream.next().await {
        let Some(output) = output.upgrade() else {
            break;
        };
        if let Err(error) = output.provide(item) {
            error!(node = %output.name, error = %error, "ignoring error from stream item");
            continue;
        }
        output.notify();
        output.runtime.spawn_drain();
    }
}

/// Abort the task and wait until it is really gone.
async fn cancel(node: &str, task: Option<JoinHandle<()>>) {
    let Some(task) = task else {
        return;
    };
    task.abort();
    match task.await {
        Ok(()) => {}
        Err(error) if error.is_cancelled() => {}
        Err(error) => {
            let failure = ReactiveError::Task {
                node: node.to_string(),
                reason: error.to_string(),
            };
            error!(node, error = %failure, "stream task failed");
        }
    }
}

impl Observer for StreamReactor {
    fn update(self: Rc<Self>) -> Update {
        Update::pending(self.restart())
    }
}

impl Reactor for StreamReactor {
    fn dispose(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        let task = self.task.borrow_mut().take();
        if task.is_some() {
            let node = self.core.name.clone();
            self.core.runtime.schedule_cleanup(
                self.core.priority(),
                Box::new(move || async move { cancel(&node, task).await }.boxed_local()),
            );
        }
    }
}
