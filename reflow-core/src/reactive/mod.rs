//! Reactive Dataflow
//!
//! This module implements the user-facing side of the engine: cells, derived
//! nodes built from reactive functions, and proxies.
//!
//! # Concepts
//!
//! ## Wrapped values
//!
//! Everything that can sit in the graph is a [`Wrapped`]: a cheap handle that
//! can be read at any time. Reading never fails loudly; a node that could not
//! compute carries a [`Failure`](crate::Failure) instead of a value, and
//! [`read`] hands it back as the `Err` side.
//!
//! ## Cells
//!
//! A [`Cell`] is the mutable input of a graph. Setting it notifies every
//! node that observes it.
//!
//! ## Reactive functions
//!
//! A [`Reactive`] (synchronous body) or [`AsyncReactive`] (future, async
//! scope or stream body) is declared once and called with [`Args`]. Wrapped
//! arguments are unwrapped before the body runs and observed, so the node
//! recomputes whenever one of them changes. Plain arguments are passed as
//! they are.
//!
//! ## Proxies
//!
//! Proxies stand between a node and its readers and decide when the node is
//! evaluated. See [`proxy`].
//!
//! # Scheduling
//!
//! Changes are not propagated on the spot. Notified nodes are queued on the
//! runtime's refresher and serviced in priority order by whoever drives the
//! runtime, so a node downstream of several changed inputs recomputes once
//! per batch and always after everything it depends on. Await
//! [`Runtime::settle`] to drain the queue, or spawn [`Runtime::drive`] to
//! keep it drained.
//!
//! # Collections
//!
//! [`collections`] gathers wrapped values into list, tuple and record nodes
//! and indexes back into them.

mod binding;
mod cell;
pub mod collections;
mod function;
pub mod proxy;
mod reactor;
mod runtime;
mod value;
mod wrapped;

pub use binding::{bind, Arg, Args, Binding, Call, Param, ParamClass, Resolved, Signature};
pub use cell::Cell;
pub use collections::{
    get_item, make_dict, make_list, make_tuple, read_or, rewrap_dict, unpack, unwrapped, Key,
    Record, Tuple,
};
pub use function::{AsyncReactive, Reactive};
pub use proxy::{lazy, visibility_gated, volatile, Forwarding, VisibilityGated};
pub use reactor::{AsyncScope, AsyncScoped, Output, Scope, Scoped};
pub use runtime::{run_local, Runtime};
pub use value::Value;
pub use wrapped::{constant, read, read_as, read_exception, wrap, Wrapped};
