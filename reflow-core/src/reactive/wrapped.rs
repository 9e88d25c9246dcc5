//! Wrapped Values
//!
//! [`Wrapped`] is the handle every node is used through: cells, constants,
//! derived nodes and proxies all look the same from the outside. A wrapped
//! value can be read (`inner`), may own a notifier that fires when it changes,
//! and carries either a value or a [`Failure`].

use std::fmt;
use std::rc::Rc;

use super::cell::CellNode;
use super::runtime::Runtime;
use super::value::Value;
use crate::error::{Failure, ReactiveError};
use crate::graph::NotifierId;

/// Behavior shared by every kind of node.
pub(crate) trait Node {
    fn name(&self) -> &str;

    /// `None` for nodes that can never change.
    fn notifier(&self) -> Option<NotifierId>;

    fn inner(&self) -> Result<Value, Failure>;

    fn runtime(&self) -> Option<&Runtime> {
        None
    }

    fn as_cell(&self) -> Option<&CellNode> {
        None
    }

    fn dispose(&self) {}
}

/// A handle to any node of the graph.
#[derive(Clone)]
pub struct Wrapped {
    node: Rc<dyn Node>,
}

impl Wrapped {
    pub(crate) fn from_node(node: Rc<dyn Node>) -> Self {
        Self { node }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// The notifier of this node, `None` for constants.
    pub fn notifier(&self) -> Option<NotifierId> {
        self.node.notifier()
    }

    pub(crate) fn runtime(&self) -> Option<&Runtime> {
        self.node.runtime()
    }

    pub fn is_constant(&self) -> bool {
        self.notifier().is_none()
    }

    /// The current value, or the carried failure.
    pub fn inner(&self) -> Result<Value, Failure> {
        self.node.inner()
    }

    /// The carried failure, if any.
    pub fn exception(&self) -> Option<Failure> {
        self.inner().err()
    }

    pub fn get<T: Clone + 'static>(&self) -> Result<T, Failure> {
        self.inner()?.get::<T>()
    }

    /// Set the value, if this node is a cell.
    pub fn try_set<T: 'static>(&self, value: T) -> Result<(), ReactiveError> {
        match self.node.as_cell() {
            Some(cell) => {
                cell.replace(Ok(Value::new(value)));
                Ok(())
            }
            None => Err(ReactiveError::ReadOnly {
                node: self.name().to_string(),
            }),
        }
    }

    /// Release whatever the node holds (open scopes, background tasks).
    ///
    /// Disposal is idempotent and also happens when the last handle drops.
    pub fn dispose(&self) {
        self.node.dispose();
    }

    pub fn ptr_eq(&self, other: &Wrapped) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Wrapped");
        out.field("name", &self.name());
        match self.inner() {
            Ok(value) => out.field("value", &value),
            Err(failure) => out.field("failure", &failure),
        };
        out.finish()
    }
}

/// A node whose value never changes.
struct Constant {
    name: Rc<str>,
    value: Result<Value, Failure>,
}

impl Node for Constant {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier(&self) -> Option<NotifierId> {
        None
    }

    fn inner(&self) -> Result<Value, Failure> {
        self.value.clone()
    }
}

pub(crate) fn resolved(name: Rc<str>, value: Result<Value, Failure>) -> Wrapped {
    Wrapped::from_node(Rc::new(Constant { name, value }))
}

/// A wrapped value that never changes.
pub fn constant<T: 'static>(value: T) -> Wrapped {
    wrap(Value::new(value))
}

/// Lift an already type-erased value.
pub fn wrap(value: Value) -> Wrapped {
    resolved(Rc::from("constant"), Ok(value))
}

/// Read the current value of a node.
pub fn read(node: &Wrapped) -> Result<Value, Failure> {
    node.inner()
}

/// Read the current value of a node as a `T`.
pub fn read_as<T: Clone + 'static>(node: &Wrapped) -> Result<T, Failure> {
    node.get::<T>()
}

/// The failure a node carries, `None` when it holds a value.
pub fn read_exception(node: &Wrapped) -> Option<Failure> {
    node.exception()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_read_back_and_never_fire() {
        let node = constant(7u8);
        assert!(node.is_constant());
        assert_eq!(read_as::<u8>(&node).unwrap(), 7);
        assert!(read_exception(&node).is_none());
    }

    #[test]
    fn constants_are_read_only() {
        let node = constant("text");
        let err = node.try_set("other").unwrap_err();
        assert!(matches!(err, ReactiveError::ReadOnly { .. }));
    }

    #[test]
    fn failed_constant_carries_its_failure() {
        let node = resolved(Rc::from("broken"), Err(Failure::msg("boom")));
        let failure = read_exception(&node).unwrap();
        assert_eq!(failure.to_string(), "boom");
        assert!(format!("{node:?}").contains("broken"));
    }
}
