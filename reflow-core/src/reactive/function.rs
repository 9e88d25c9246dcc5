//! Reactive Functions
//!
//! The entry points that turn ordinary functions into graph nodes.
//!
//! A reactive function is declared once, with a name, a [`Signature`] and a
//! body, and then called any number of times with [`Args`]. Each call binds
//! the arguments and builds a new node that recomputes whenever one of its
//! wrapped arguments changes.
//!
//! # Example
//!
//! ```
//! use reflow_core::{args, read_as, run_local, Failure, Reactive, Runtime, Signature, Value};
//!
//! run_local(async {
//!     let runtime = Runtime::new();
//!     let a = runtime.cell(1);
//!     let b = runtime.cell(2);
//!
//!     let add = Reactive::sync("add", Signature::of(["a", "b"]), |call| {
//!         Ok::<_, Failure>(Value::new(call.get::<i32>("a")? + call.get::<i32>("b")?))
//!     });
//!     let sum = add.call(&runtime, args![&a, &b]).unwrap();
//!     assert_eq!(read_as::<i32>(&sum).unwrap(), 3);
//!
//!     a.set(10);
//!     runtime.settle().await;
//!     assert_eq!(read_as::<i32>(&sum).unwrap(), 12);
//! })
//! .unwrap();
//! ```

use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::stream::LocalBoxStream;
use futures_util::{FutureExt, Stream, StreamExt};

use super::binding::{bind, Args, Call, Signature};
use super::reactor::{
    settle_output, AsyncFn, AsyncScope, AsyncScopeFn, AsyncScopeReactor, FutureReactor, Output,
    Scope, ScopeFn, ScopeReactor, StreamFn, StreamReactor, SyncFn, SyncReactor,
};
use super::runtime::Runtime;
use super::wrapped::Wrapped;
use crate::error::{Failure, ReactiveError};

#[derive(Clone)]
enum SyncShape {
    Eager(SyncFn),
    Lazy(SyncFn),
    Scope(ScopeFn),
}

/// A reactive function whose body runs synchronously.
#[derive(Clone)]
pub struct Reactive {
    name: Rc<str>,
    signature: Signature,
    shape: SyncShape,
    extra: Vec<Wrapped>,
}

impl Reactive {
    fn with_shape(name: &str, signature: Signature, shape: SyncShape) -> Self {
        Self {
            name: Rc::from(name),
            signature,
            shape,
            extra: Vec::new(),
        }
    }

    /// Recompute eagerly whenever an input changes.
    pub fn sync<F, O>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(&Call) -> Result<O, Failure> + 'static,
        O: Into<Output>,
    {
        Self::with_shape(name, signature, SyncShape::Eager(sync_fn(body)))
    }

    /// Only mark the node dirty on change; recompute when it is read.
    pub fn lazy<F, O>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(&Call) -> Result<O, Failure> + 'static,
        O: Into<Output>,
    {
        Self::with_shape(name, signature, SyncShape::Lazy(sync_fn(body)))
    }

    /// The body returns a [`Scope`] that is exited before every recompute
    /// and on disposal.
    pub fn scoped<F, S>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(&Call) -> Result<S, Failure> + 'static,
        S: Scope + 'static,
    {
        let factory: ScopeFn =
            Rc::new(move |call: &Call| body(call).map(|scope| Box::new(scope) as Box<dyn Scope>));
        Self::with_shape(name, signature, SyncShape::Scope(factory))
    }

    /// Also recompute when `node` changes, without passing it to the body.
    pub fn depends_on(mut self, node: &Wrapped) -> Self {
        self.extra.push(node.clone());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind `args` and build a node.
    ///
    /// When no argument is wrapped there is nothing to react to: eager and
    /// lazy functions are then called once and the result comes back as a
    /// constant.
    pub fn call(&self, runtime: &Runtime, args: Args) -> Result<Wrapped, ReactiveError> {
        let binding = bind(&self.name, &self.signature, args)?.with_extra(&self.extra);
        match &self.shape {
            SyncShape::Eager(body) | SyncShape::Lazy(body) if !binding.is_reactive() => {
                let outcome = binding.rewrap().and_then(|call| body(&call));
                Ok(settle_output(runtime, self.name.clone(), outcome))
            }
            SyncShape::Eager(body) => SyncReactor::build(runtime, binding, body.clone(), false),
            SyncShape::Lazy(body) => SyncReactor::build(runtime, binding, body.clone(), true),
            SyncShape::Scope(factory) => ScopeReactor::build(runtime, binding, factory.clone()),
        }
    }
}

fn sync_fn<F, O>(body: F) -> SyncFn
where
    F: Fn(&Call) -> Result<O, Failure> + 'static,
    O: Into<Output>,
{
    Rc::new(move |call: &Call| -> Result<Output, Failure> { body(call).map(Into::into) })
}

#[derive(Clone)]
enum AsyncShape {
    Future(AsyncFn),
    Scope(AsyncScopeFn),
    Stream(StreamFn),
}

/// A reactive function whose body is asynchronous.
#[derive(Clone)]
pub struct AsyncReactive {
    name: Rc<str>,
    signature: Signature,
    shape: AsyncShape,
    extra: Vec<Wrapped>,
}

impl AsyncReactive {
    fn with_shape(name: &str, signature: Signature, shape: AsyncShape) -> Self {
        Self {
            name: Rc::from(name),
            signature,
            shape,
            extra: Vec::new(),
        }
    }

    /// The body returns a future; the node takes its output.
    pub fn future<F, Fut, O>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(Call) -> Fut + 'static,
        Fut: Future<Output = Result<O, Failure>> + 'static,
        O: Into<Output>,
    {
        let func: AsyncFn = Rc::new(move |call: Call| -> LocalBoxFuture<'static, Result<Output, Failure>> {
            let pending = body(call);
            async move { pending.await.map(Into::into) }.boxed_local()
        });
        Self::with_shape(name, signature, AsyncShape::Future(func))
    }

    /// The body returns an [`AsyncScope`].
    pub fn scoped<F, S>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(Call) -> Result<S, Failure> + 'static,
        S: AsyncScope + 'static,
    {
        let factory: AsyncScopeFn = Rc::new(move |call: Call| {
            body(call).map(|scope| Box::new(scope) as Box<dyn AsyncScope>)
        });
        Self::with_shape(name, signature, AsyncShape::Scope(factory))
    }

    /// The body returns a stream; every item becomes the node's value.
    pub fn stream<F, St, O>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(Call) -> St + 'static,
        St: Stream<Item = Result<O, Failure>> + 'static,
        O: Into<Output>,
    {
        let func: StreamFn = Rc::new(
            move |call: Call| -> LocalBoxStream<'static, Result<Output, Failure>> {
                let items = StreamExt::map(body(call), |item| item.map(Into::into));
                StreamExt::boxed_local(items)
            },
        );
        Self::with_shape(name, signature, AsyncShape::Stream(func))
    }

    /// Also recompute when `node` changes, without passing it to the body.
    pub fn depends_on(mut self, node: &Wrapped) -> Self {
        self.extra.push(node.clone());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind `args` and build a node, waiting for its first value.
    ///
    /// Stream nodes are an exception: they start out uninitialized and take
    /// a value when the stream yields one.
    pub async fn call(&self, runtime: &Runtime, args: Args) -> Result<Wrapped, ReactiveError> {
        let binding = bind(&self.name, &self.signature, args)?.with_extra(&self.extra);
        match &self.shape {
            AsyncShape::Future(body) if !binding.is_reactive() => {
                let outcome = match binding.rewrap() {
                    Ok(call) => body(call).await,
                    Err(failure) => Err(failure),
                };
                Ok(settle_output(runtime, self.name.clone(), outcome))
            }
            AsyncShape::Future(body) => FutureReactor::build(runtime, binding, body.clone()).await,
            AsyncShape::Scope(factory) => {
                AsyncScopeReactor::build(runtime, binding, factory.clone()).await
            }
            AsyncShape::Stream(body) => StreamReactor::build(runtime, binding, body.clone()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{read_as, read_exception, run_local, Value};
    use crate::{args, Scoped};
    use std::cell::Cell as Counter;

    fn counted_add(calls: &Rc<Counter<u32>>) -> Reactive {
        let calls = calls.clone();
        Reactive::sync("add", Signature::of(["a", "b"]), move |call| {
            calls.set(calls.get() + 1);
            Ok::<_, Failure>(Value::new(call.get::<i32>("a")? + call.get::<i32>("b")?))
        })
    }

    #[test]
    fn plain_arguments_give_a_constant() {
        let runtime = Runtime::new();
        let calls = Rc::new(Counter::new(0));
        let node = counted_add(&calls)
            .call(&runtime, Args::new().value(1).value(2))
            .unwrap();

        assert!(node.is_constant());
        assert_eq!(read_as::<i32>(&node).unwrap(), 3);
        assert_eq!(runtime.node_count(), 0);
    }

    #[test]
    fn eager_node_recomputes_once_per_batch() {
        run_local(async {
            let runtime = Runtime::new();
            let a = runtime.cell(1);
            let b = runtime.cell(2);
            let calls = Rc::new(Counter::new(0));
            let sum = counted_add(&calls).call(&runtime, args![&a, &b]).unwrap();
            assert_eq!(calls.get(), 1);

            a.set(10);
            b.set(20);
            runtime.settle().await;
            assert_eq!(calls.get(), 2);
            assert_eq!(read_as::<i32>(&sum).unwrap(), 30);
        })
        .unwrap();
    }

    #[test]
    fn lazy_node_waits_for_a_read() {
        run_local(async {
            let runtime = Runtime::new();
            let a = runtime.cell(1);
            let calls = Rc::new(Counter::new(0));
            let counter = calls.clone();
            let double = Reactive::lazy("double", Signature::of(["x"]), move |call| {
                counter.set(counter.get() + 1);
                Ok::<_, Failure>(Value::new(call.get::<i32>("x")? * 2))
            });

            let node = double.call(&runtime, args![&a]).unwrap();
            assert_eq!(calls.get(), 0);

            a.set(5);
            a.set(6);
            runtime.settle().await;
            assert_eq!(calls.get(), 0);

            assert_eq!(read_as::<i32>(&node).unwrap(), 12);
            assert_eq!(read_as::<i32>(&node).unwrap(), 12);
            assert_eq!(calls.get(), 1);
        })
        .unwrap();
    }

    #[test]
    fn depends_on_triggers_recompute() {
        run_local(async {
            let runtime = Runtime::new();
            let tick = runtime.cell(0u32);
            let calls = Rc::new(Counter::new(0));
            let counter = calls.clone();
            let sample = Reactive::sync("sample", Signature::new(), move |_| {
                counter.set(counter.get() + 1);
                Ok::<_, Failure>(Value::unit())
            })
            .depends_on(&tick.as_wrapped());

            let _node = sample.call(&runtime, Args::new()).unwrap();
            tick.set(1u32);
            runtime.settle().await;
            assert_eq!(calls.get(), 2);
        })
        .unwrap();
    }

    #[test]
    fn binding_errors_surface_synchronously() {
        let runtime = Runtime::new();
        let calls = Rc::new(Counter::new(0));
        let err = counted_add(&calls)
            .call(&runtime, Args::new().value(1))
            .unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn future_node_resolves_before_returning() {
        run_local(async {
            let runtime = Runtime::new();
            let a = runtime.cell(2);
            let square = AsyncReactive::future("square", Signature::of(["x"]), |call: Call| async move {
                tokio::task::yield_now().await;
                let x = call.get::<i32>("x")?;
                Ok::<_, Failure>(Value::new(x * x))
            });

            let node = square.call(&runtime, args![&a]).await.unwrap();
            assert_eq!(read_as::<i32>(&node).unwrap(), 4);

            a.set(3);
            runtime.settle().await;
            assert_eq!(read_as::<i32>(&node).unwrap(), 9);
        })
        .unwrap();
    }

    #[test]
    fn scoped_node_exits_previous_scope() {
        run_local(async {
            let runtime = Runtime::new();
            let n = runtime.cell(1);
            let exits = Rc::new(Counter::new(0));
            let counter = exits.clone();
            let open = Reactive::scoped("open", Signature::of(["n"]), move |call| {
                let counter = counter.clone();
                Ok(Scoped::new(Value::new(call.get::<i32>("n")?), move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                }))
            });

            let node = open.call(&runtime, args![&n]).unwrap();
            n.set(2);
            runtime.settle().await;
            assert_eq!(exits.get(), 1);
            assert_eq!(read_as::<i32>(&node).unwrap(), 2);

            drop(node);
            runtime.settle().await;
            assert_eq!(exits.get(), 2);
        })
        .unwrap();
    }

    #[test]
    fn failed_scope_factory_is_carried() {
        run_local(async {
            let runtime = Runtime::new();
            let n = runtime.cell(1);
            let open = Reactive::scoped("open", Signature::of(["n"]), |_call| {
                Err::<Scoped, _>(Failure::msg("no connection"))
            });
            let node = open.call(&runtime, args![&n]).unwrap();
            assert_eq!(read_exception(&node).unwrap().to_string(), "no connection");
        })
        .unwrap();
    }
}
