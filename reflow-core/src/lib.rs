//! Reflow Core
//!
//! This crate provides the runtime for Reflow, a reactive dataflow engine.
//! It implements:
//!
//! - Mutable input cells and derived nodes built from ordinary functions
//! - Glitch-free, priority-ordered change propagation
//! - Synchronous, async, scoped (acquire/release) and streaming node bodies
//! - Proxies that control how eagerly a node is evaluated
//! - List, tuple and record nodes built from wrapped members
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: the notifier arena and the refresher queue that orders updates
//! - `reactive`: cells, reactive functions, reactors and proxies
//! - `error`: the error and failure types carried through the graph
//! - `config`: runtime settings
//!
//! Everything runs on one thread. Writes only queue work; awaiting
//! [`Runtime::settle`] (or spawning [`Runtime::drive`]) propagates it. Stream
//! nodes spawn local tasks and need a tokio `LocalSet`; [`run_local`] builds
//! one.
//!
//! # Example
//!
//! ```
//! use reflow_core::{args, read_as, run_local, Failure, Reactive, Runtime, Signature, Value};
//!
//! run_local(async {
//!     let runtime = Runtime::new();
//!     let count = runtime.cell(1);
//!
//!     let double = Reactive::sync("double", Signature::of(["n"]), |call| {
//!         Ok::<_, Failure>(Value::new(call.get::<i32>("n")? * 2))
//!     });
//!     let doubled = double.call(&runtime, args![&count]).unwrap();
//!
//!     count.set(5);
//!     runtime.settle().await;
//!     assert_eq!(read_as::<i32>(&doubled).unwrap(), 10);
//! })
//! .unwrap();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{Failure, ReactiveError};
pub use reactive::{
    bind, constant, get_item, lazy, make_dict, make_list, make_tuple, read, read_as,
    read_exception, read_or, rewrap_dict, run_local, unpack, unwrapped, visibility_gated,
    volatile, wrap, Arg, Args, AsyncReactive, AsyncScope, AsyncScoped, Binding, Call, Cell,
    Forwarding, Key, Output, Param, ParamClass, Reactive, Record, Resolved, Runtime, Scope,
    Scoped, Signature, Tuple, Value, VisibilityGated, Wrapped,
};
