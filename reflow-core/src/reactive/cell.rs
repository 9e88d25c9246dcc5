//! Cells
//!
//! A cell is the writable root of a dataflow graph. It holds a value (or a
//! carried failure) and notifies its observers every time it is written.
//!
//! # How Cells Work
//!
//! 1. A cell registers a notifier with its runtime. Cells observe nothing, so
//!    the notifier stays at priority 0.
//!
//! 2. Writing replaces the content and bumps a version counter. Writes are
//!    not compared against the previous value: setting the same value again
//!    still notifies.
//!
//! 3. Notification queues the observers. They run when the runtime drains,
//!    so several writes in a row cost one recompute per dependent.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::runtime::Runtime;
use super::value::Value;
use super::wrapped::{Node, Wrapped};
use crate::error::Failure;
use crate::graph::NotifierId;

pub(crate) struct CellNode {
    runtime: Runtime,
    id: NotifierId,
    name: Rc<str>,
    state: RefCell<CellState>,
}

struct CellState {
    value: Result<Value, Failure>,
    version: u64,
}

impl CellNode {
    /// Store new content and notify observers.
    pub(crate) fn replace(&self, value: Result<Value, Failure>) {
        let version = {
            let mut state = self.state.borrow_mut();
            state.value = value;
            state.version += 1;
            state.version
        };
        trace!(node = %self.name, version, "cell written");
        self.runtime.notify_observers(self.id);
    }

    fn version(&self) -> u64 {
        self.state.borrow().version
    }
}

impl Node for CellNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier(&self) -> Option<NotifierId> {
        Some(self.id)
    }

    fn inner(&self) -> Result<Value, Failure> {
        self.state.borrow().value.clone()
    }

    fn runtime(&self) -> Option<&Runtime> {
        Some(&self.runtime)
    }

    fn as_cell(&self) -> Option<&CellNode> {
        Some(self)
    }
}

impl Drop for CellNode {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

/// A writable node.
///
/// Clones share the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.cell(0);
///
/// count.set(5);
/// assert_eq!(count.get::<i32>().unwrap(), 5);
/// ```
#[derive(Clone)]
pub struct Cell {
    node: Rc<CellNode>,
}

impl Cell {
    pub(crate) fn new(runtime: &Runtime, name: &str, value: Result<Value, Failure>) -> Self {
        let name: Rc<str> = Rc::from(name);
        let id = runtime.register(name.clone(), None);
        Self {
            node: Rc::new(CellNode {
                runtime: runtime.clone(),
                id,
                name,
                state: RefCell::new(CellState { value, version: 0 }),
            }),
        }
    }

    pub fn set<T: 'static>(&self, value: T) {
        self.node.replace(Ok(Value::new(value)));
    }

    pub fn set_value(&self, value: Value) {
        self.node.replace(Ok(value));
    }

    /// Make the cell carry a failure. Dependents see it as an argument
    /// failure.
    pub fn set_failure(&self, failure: Failure) {
        self.node.replace(Err(failure));
    }

    /// Replace the value with `f(current)`.
    ///
    /// Fails without writing if the cell is empty or holds another type.
    pub fn update<T, F>(&self, f: F) -> Result<(), Failure>
    where
        T: Clone + 'static,
        F: FnOnce(&T) -> T,
    {
        let current = self.get::<T>()?;
        self.set(f(&current));
        Ok(())
    }

    pub fn get<T: Clone + 'static>(&self) -> Result<T, Failure> {
        self.node.inner()?.get::<T>()
    }

    pub fn inner(&self) -> Result<Value, Failure> {
        self.node.inner()
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        self.node.version()
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn as_wrapped(&self) -> Wrapped {
        Wrapped::from_node(self.node.clone())
    }
}

impl From<Cell> for Wrapped {
    fn from(cell: Cell) -> Self {
        cell.as_wrapped()
    }
}

impl From<&Cell> for Wrapped {
    fn from(cell: &Cell) -> Self {
        cell.as_wrapped()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

// ---- Tests ----
