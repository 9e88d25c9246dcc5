//! Dynamic Values
//!
//! Nodes of the graph hold values of arbitrary type. A [`Value`] is a shared,
//! immutable, type-erased payload that remembers the name of its type so a
//! failed downcast can say what it actually found.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use crate::error::{Failure, ReactiveError};

/// A type-erased value stored in a node.
#[derive(Clone)]
pub struct Value {
    inner: Rc<dyn Any>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// The unit value, for functions that run only for their side effects.
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Clone the payload out as a `T`, or fail with a type mismatch.
    pub fn get<T: Clone + 'static>(&self) -> Result<T, Failure> {
        self.downcast_ref::<T>().cloned().ok_or_else(|| {
            Failure::new(ReactiveError::TypeMismatch {
                expected: type_name::<T>(),
                found: self.type_name,
            })
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both values share the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>", self.type_name)
    }
}
