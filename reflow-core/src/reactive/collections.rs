//! Collection Nodes
//!
//! Helpers that gather several wrapped values into one node, and take one
//! back out again.
//!
//! Three container shapes are used, all stored as plain [`Value`]s:
//!
//! | Built by                     | Value type                     |
//! |------------------------------|--------------------------------|
//! | [`make_list`]                | `Vec<Value>`                   |
//! | [`make_tuple`]               | [`Tuple`] (`Rc<[Value]>`)      |
//! | [`make_dict`], [`rewrap_dict`] | [`Record`] (keys in order)   |
//!
//! [`get_item`] reads from any of them and [`unpack`] splits a sequence into
//! one node per position. Each helper builds an eager node, so a member that
//! fails makes the whole collection carry an argument failure.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::binding::{Arg, Args, Call, Signature};
use super::function::Reactive;
use super::runtime::Runtime;
use super::value::Value;
use super::wrapped::{wrap, Wrapped};
use crate::error::{Failure, ReactiveError};

/// Fixed-length sequence produced by [`make_tuple`].
pub type Tuple = Rc<[Value]>;

/// Keyed values produced by [`make_dict`] and [`rewrap_dict`].
pub type Record = IndexMap<String, Value>;

/// Position in a sequence or key in a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

fn members(call: &Call) -> Result<Vec<Value>, Failure> {
    Ok(call.values("items")?.to_vec())
}

/// A node holding the values of `items`, in order, as a `Vec<Value>`.
pub fn make_list(runtime: &Runtime, items: Vec<Wrapped>) -> Result<Wrapped, ReactiveError> {
    Reactive::sync("make_list", Signature::of(["items"]), |call| {
        members(call).map(Value::new)
    })
    .call(runtime, Args::new().arg(items))
}

/// Like [`make_list`], but the value is an immutable [`Tuple`].
pub fn make_tuple(runtime: &Runtime, items: Vec<Wrapped>) -> Result<Wrapped, ReactiveError> {
    Reactive::sync("make_tuple", Signature::of(["items"]), |call| {
        members(call).map(|values| Value::new(Tuple::from(values)))
    })
    .call(runtime, Args::new().arg(items))
}

/// A node holding a [`Record`] built from `entries`.
///
/// Entries may be plain values, wrapped values or groups; a group becomes a
/// nested list node.
pub fn make_dict<K, A>(
    runtime: &Runtime,
    entries: impl IntoIterator<Item = (K, A)>,
) -> Result<Wrapped, ReactiveError>
where
    K: Into<String>,
    A: Into<Arg>,
{
    let mut record = IndexMap::new();
    for (key, arg) in entries {
        let node = match arg.into() {
            Arg::Plain(value) => wrap(value),
            Arg::Wrapped(node) => node,
            Arg::Group(nodes) => make_list(runtime, nodes)?,
        };
        record.insert(key.into(), node);
    }
    build_record(runtime, "make_dict", record)
}

/// Turn a map of wrapped values into one node holding a [`Record`].
pub fn rewrap_dict(
    runtime: &Runtime,
    entries: &IndexMap<String, Wrapped>,
) -> Result<Wrapped, ReactiveError> {
    build_record(runtime, "rewrap_dict", entries.clone())
}

fn build_record(
    runtime: &Runtime,
    name: &str,
    entries: IndexMap<String, Wrapped>,
) -> Result<Wrapped, ReactiveError> {
    let (keys, nodes): (Vec<String>, Vec<Wrapped>) = entries.into_iter().unzip();
    Reactive::sync(name, Signature::of(["keys", "items"]), |call| {
        let keys = call.get::<Vec<String>>("keys")?;
        let record: Record = keys.into_iter().zip(members(call)?).collect();
        Ok::<_, Failure>(Value::new(record))
    })
    .call(runtime, Args::new().value(keys).arg(nodes))
}

/// Look `key` up in a collection value.
pub fn item(container: &Value, key: &Key) -> Result<Value, Failure> {
    let found = match key {
        Key::Index(index) => {
            if let Some(list) = container.downcast_ref::<Vec<Value>>() {
                list.get(*index).cloned()
            } else if let Some(tuple) = container.downcast_ref::<Tuple>() {
                tuple.get(*index).cloned()
            } else {
                return Err(mismatch("a list or tuple", container));
            }
        }
        Key::Name(name) => match container.downcast_ref::<Record>() {
            Some(record) => record.get(name).cloned(),
            None => return Err(mismatch("a record", container)),
        },
    };
    found.ok_or_else(|| {
        Failure::new(ReactiveError::MissingItem {
            container: container.type_name(),
            key: key.to_string(),
        })
    })
}

fn mismatch(expected: &'static str, found: &Value) -> Failure {
    Failure::new(ReactiveError::TypeMismatch {
        expected,
        found: found.type_name(),
    })
}

/// A node following one item of `container`.
pub fn get_item(
    runtime: &Runtime,
    container: &Wrapped,
    key: impl Into<Key>,
) -> Result<Wrapped, ReactiveError> {
    Reactive::sync("get_item", Signature::of(["container", "key"]), |call| {
        item(call.value("container")?, &call.get::<Key>("key")?)
    })
    .call(runtime, Args::new().arg(container).value(key.into()))
}

/// Split a sequence node into `len` nodes, one per position.
///
/// Positions the current value does not have carry a
/// [`ReactiveError::MissingItem`] failure until it grows.
pub fn unpack(
    runtime: &Runtime,
    container: &Wrapped,
    len: usize,
) -> Result<Vec<Wrapped>, ReactiveError> {
    (0..len)
        .map(|index| get_item(runtime, container, index))
        .collect()
}

/// Read `node` as a `T`, or `default` when it fails or holds another type.
pub fn read_or<T: Clone + 'static>(node: &Wrapped, default: T) -> T {
    node.get::<T>().unwrap_or(default)
}

/// The value behind an argument, reading it only if it is wrapped.
///
/// A group reads as a `Vec<Value>` of its members.
pub fn unwrapped(arg: &Arg) -> Result<Value, Failure> {
    match arg {
        Arg::Plain(value) => Ok(value.clone()),
        Arg::Wrapped(node) => node.inner(),
        Arg::Group(nodes) => nodes
            .iter()
            .map(Wrapped::inner)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{constant, read_as, read_exception, run_local};

    fn ints(value: &Value) -> Vec<i32> {
        let list = value.downcast_ref::<Vec<Value>>().unwrap();
        list.iter().map(|item| item.get::<i32>().unwrap()).collect()
    }

    #[test]
    fn list_follows_its_members() {
        run_local(async {
            let runtime = Runtime::new();
            let a = runtime.cell(1);
            let b = runtime.cell(2);
            let list = make_list(&runtime, vec![a.as_wrapped(), b.as_wrapped()]).unwrap();
            assert_eq!(ints(&list.inner().unwrap()), vec![1, 2]);

            b.set(20);
            runtime.settle().await;
            assert_eq!(ints(&list.inner().unwrap()), vec![1, 20]);
        })
        .unwrap();
    }

    #[test]
    fn failing_member_fails_the_list() {
        let runtime = Runtime::new();
        let a = runtime.cell(1);
        let b = runtime.cell_uninit();
        let list = make_list(&runtime, vec![a.as_wrapped(), b.as_wrapped()]).unwrap();
        assert!(matches!(
            read_exception(&list).unwrap().error(),
            ReactiveError::Argument { .. }
        ));
    }

    #[test]
    fn tuples_unpack_into_positions() {
        run_local(async {
            let runtime = Runtime::new();
            let x = runtime.cell(3);
            let pair = make_tuple(&runtime, vec![x.as_wrapped(), constant(4)]).unwrap();
            let parts = unpack(&runtime, &pair, 3).unwrap();

            assert_eq!(read_as::<i32>(&parts[0]).unwrap(), 3);
            assert_eq!(read_as::<i32>(&parts[1]).unwrap(), 4);
            assert!(matches!(
                read_exception(&parts[2]).unwrap().error(),
                ReactiveError::MissingItem { .. }
            ));

            x.set(30);
            runtime.settle().await;
            assert_eq!(read_as::<i32>(&parts[0]).unwrap(), 30);
        })
        .unwrap();
    }

    #[test]
    fn dicts_are_indexed_by_name() {
        run_local(async {
            let runtime = Runtime::new();
            let width = runtime.cell(640);
            let record = make_dict(
                &runtime,
                [
                    ("width", Arg::from(&width)),
                    ("height", Arg::plain(480)),
                ],
            )
            .unwrap();
            let w = get_item(&runtime, &record, "width").unwrap();
            let keys: Vec<String> = record
                .get::<Record>()
                .unwrap()
                .keys()
                .cloned()
                .collect();
            assert_eq!(keys, vec!["width", "height"]);

            width.set(800);
            runtime.settle().await;
            assert_eq!(read_as::<i32>(&w).unwrap(), 800);

            let missing = get_item(&runtime, &record, "depth").unwrap();
            assert!(read_exception(&missing).unwrap().to_string().contains("'depth'"));
            let wrong = get_item(&runtime, &record, 0usize).unwrap();
            assert!(matches!(
                read_exception(&wrong).unwrap().error(),
                ReactiveError::TypeMismatch { .. }
            ));
        })
        .unwrap();
    }

    #[test]
    fn rewrapped_dict_observes_every_value() {
        run_local(async {
            let runtime = Runtime::new();
            let a = runtime.cell("a");
            let b = runtime.cell("b");
            let entries: IndexMap<String, Wrapped> = [
                ("first".to_string(), a.as_wrapped()),
                ("second".to_string(), b.as_wrapped()),
            ]
            .into_iter()
            .collect();
            let record = rewrap_dict(&runtime, &entries).unwrap();

            a.set("A");
            runtime.settle().await;
            let record = record.get::<Record>().unwrap();
            assert_eq!(record["first"].get::<&str>().unwrap(), "A");
            assert_eq!(record["second"].get::<&str>().unwrap(), "b");
        })
        .unwrap();
    }

    #[test]
    fn read_or_falls_back() {
        let runtime = Runtime::new();
        let empty = runtime.cell_uninit();
        let text = runtime.cell("text");
        assert_eq!(read_or(&empty.as_wrapped(), 5), 5);
        assert_eq!(read_or(&text.as_wrapped(), 5), 5);
        assert_eq!(read_or(&text.as_wrapped(), "none"), "text");
    }

    #[test]
    fn unwrapped_reads_only_wrapped_arguments() {
        let runtime = Runtime::new();
        let a = runtime.cell(1);
        assert_eq!(unwrapped(&Arg::plain(2)).unwrap().get::<i32>().unwrap(), 2);
        assert_eq!(unwrapped(&Arg::from(&a)).unwrap().get::<i32>().unwrap(), 1);

        let group = Arg::Group(vec![a.as_wrapped(), constant(7)]);
        assert_eq!(ints(&unwrapped(&group).unwrap()), vec![1, 7]);
        assert!(unwrapped(&Arg::from(runtime.cell_uninit())).is_err());
    }
}
