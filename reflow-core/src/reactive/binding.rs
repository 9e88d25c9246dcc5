//! Argument Binding
//!
//! A reactive function is declared with a [`Signature`] and called with
//! [`Args`]. Binding matches the arguments against the parameters once, when
//! the node is built. Every recompute then *rewraps* the binding into a
//! [`Call`]: the snapshot of argument values the user function receives.
//!
//! Parameters come in three classes:
//!
//! - **Implicit** (the default): wrapped arguments are observed and unwrapped
//!   before the call. If one carries a failure the call does not happen and
//!   the node fails with [`ReactiveError::Argument`].
//! - **Pass-through**: handed to the function still wrapped and not observed,
//!   so the function decides for itself whether and how to read it. Returning
//!   it from the body redirects the node to it.
//! - **Dependency-only**: observed and then dropped. The function never sees
//!   it. Useful to recompute on a signal without consuming its value.
//!
//! An argument can also be a group of wrapped values ([`Arg::Group`]); each
//! member is observed and, for implicit parameters, unwrapped into a list.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::cell::Cell;
use super::value::Value;
use super::wrapped::{wrap, Wrapped};
use crate::error::{Failure, ReactiveError};

/// How a parameter treats wrapped arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    Implicit,
    PassThrough,
    DependencyOnly,
}

#[derive(Debug, Clone)]
pub struct Param {
    name: Rc<str>,
    class: ParamClass,
    default: Option<Arg>,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ParamClass {
        self.class
    }
}

/// The parameter list of a reactive function.
///
/// ```
/// use reflow_core::Signature;
///
/// let signature = Signature::of(["data", "style"])
///     .pass_through("style")
///     .dependency_only("refresh");
/// assert_eq!(signature.params().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required implicit parameters, in order.
    pub fn of<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .fold(Self::new(), |signature, name| signature.param(name))
    }

    /// Add a required implicit parameter.
    pub fn param(self, name: &str) -> Self {
        self.declare(name, ParamClass::Implicit, None)
    }

    /// Add an implicit parameter with a default.
    pub fn param_or(self, name: &str, default: impl Into<Arg>) -> Self {
        self.declare(name, ParamClass::Implicit, Some(default.into()))
    }

    /// Declare `name` pass-through, adding it if it does not exist yet.
    pub fn pass_through(self, name: &str) -> Self {
        self.declare(name, ParamClass::PassThrough, None)
    }

    /// Declare `name` dependency-only. It defaults to an empty group.
    pub fn dependency_only(self, name: &str) -> Self {
        self.declare(name, ParamClass::DependencyOnly, None)
    }

    fn declare(mut self, name: &str, class: ParamClass, default: Option<Arg>) -> Self {
        match self.params.iter_mut().find(|param| &*param.name == name) {
            Some(param) => {
                param.class = class;
                if default.is_some() {
                    param.default = default;
                }
            }
            None => self.params.push(Param {
                name: Rc::from(name),
                class,
                default,
            }),
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// One argument of a call.
#[derive(Clone)]
pub enum Arg {
    Plain(Value),
    Wrapped(Wrapped),
    Group(Vec<Wrapped>),
}

impl Arg {
    pub fn plain<T: 'static>(value: T) -> Self {
        Self::Plain(Value::new(value))
    }

    fn wrapped(&self) -> impl Iterator<Item = &Wrapped> {
        let members: &[Wrapped] = match self {
            Self::Plain(_) => &[],
            Self::Wrapped(node) => std::slice::from_ref(node),
            Self::Group(nodes) => nodes,
        };
        members.iter()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Wrapped(node) => f.debug_tuple("Wrapped").field(&node.name()).finish(),
            Self::Group(nodes) => f.debug_tuple("Group").field(&nodes.len()).finish(),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<Wrapped> for Arg {
    fn from(node: Wrapped) -> Self {
        Self::Wrapped(node)
    }
}

impl From<&Wrapped> for Arg {
    fn from(node: &Wrapped) -> Self {
        Self::Wrapped(node.clone())
    }
}

impl From<&Cell> for Arg {
    fn from(cell: &Cell) -> Self {
        Self::Wrapped(cell.as_wrapped())
    }
}

impl From<Cell> for Arg {
    fn from(cell: Cell) -> Self {
        Self::Wrapped(cell.as_wrapped())
    }
}

impl From<Vec<Wrapped>> for Arg {
    fn from(nodes: Vec<Wrapped>) -> Self {
        Self::Group(nodes)
    }
}

/// The arguments of one call: positionals first, then keywords.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Arg>,
    keyword: IndexMap<String, Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// A plain (never changing) positional argument.
    pub fn value<T: 'static>(self, value: T) -> Self {
        self.arg(Arg::plain(value))
    }

    /// A keyword argument. Repeating a keyword replaces the earlier one.
    pub fn kwarg(mut self, name: &str, arg: impl Into<Arg>) -> Self {
        self.keyword.insert(name.to_string(), arg.into());
        self
    }

    pub fn kwvalue<T: 'static>(self, name: &str, value: T) -> Self {
        self.kwarg(name, Arg::plain(value))
    }
}

/// Build [`Args`] from positional arguments.
///
/// ```
/// use reflow_core::{args, Runtime};
///
/// let runtime = Runtime::new();
/// let a = runtime.cell(1);
/// let b = runtime.cell(2);
/// let args = args![&a, &b].kwvalue("scale", 10);
/// # let _ = args;
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        $crate::Args::new()$(.arg($arg))*
    };
}

struct Bound {
    name: Rc<str>,
    class: ParamClass,
    arg: Arg,
}

/// Arguments matched against a signature.
pub struct Binding {
    function: Rc<str>,
    params: Vec<Bound>,
    extra: Vec<Wrapped>,
}

/// Match `args` against `signature`.
///
/// Unknown keywords, surplus positionals, duplicates and missing required
/// parameters are rejected with [`ReactiveError::Binding`].
pub fn bind(function: &str, signature: &Signature, args: Args) -> Result<Binding, ReactiveError> {
    let misuse = |reason: String| ReactiveError::Binding {
        function: function.to_string(),
        reason,
    };

    let params = signature.params();
    if args.positional.len() > params.len() {
        return Err(misuse(format!(
            "takes {} arguments but {} were given",
            params.len(),
            args.positional.len()
        )));
    }

    let mut slots: Vec<Option<Arg>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args.positional) {
        *slot = Some(arg);
    }

    for (name, arg) in args.keyword {
        let Some(position) = params.iter().position(|param| *param.name == *name) else {
            return Err(misuse(format!("unexpected argument '{name}'")));
        };
        if slots[position].is_some() {
            return Err(misuse(format!("got multiple values for argument '{name}'")));
        }
        slots[position] = Some(arg);
    }

    let mut bound = Vec::with_capacity(params.len());
    for (param, slot) in params.iter().zip(slots) {
        let arg = match (slot, &param.default, param.class) {
            (Some(arg), _, _) => arg,
            (None, Some(default), _) => default.clone(),
            (None, None, ParamClass::DependencyOnly) => Arg::Group(Vec::new()),
            (None, None, _) => {
                return Err(misuse(format!("missing argument '{}'", param.name)));
            }
        };
        bound.push(Bound {
            name: param.name.clone(),
            class: param.class,
            arg,
        });
    }

    Ok(Binding {
        function: Rc::from(function),
        params: bound,
        extra: Vec::new(),
    })
}

impl Binding {
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Add dependencies that are observed but not passed to the function.
    pub fn with_extra(mut self, extra: &[Wrapped]) -> Self {
        self.extra.extend(extra.iter().cloned());
        self
    }

    /// Every wrapped value the node built from this binding must observe.
    ///
    /// Pass-through arguments are handed over as they are and not observed.
    pub fn observed(&self) -> impl Iterator<Item = &Wrapped> {
        self.params
            .iter()
            .filter(|bound| bound.class != ParamClass::PassThrough)
            .flat_map(|bound| bound.arg.wrapped())
            .chain(self.extra.iter())
    }

    /// Whether any argument is wrapped, i.e. a node is needed at all.
    pub fn is_reactive(&self) -> bool {
        self.observed().next().is_some()
    }

    /// Snapshot the current argument values for one call.
    pub fn rewrap(&self) -> Result<Call, Failure> {
        let mut args = IndexMap::with_capacity(self.params.len());
        for bound in &self.params {
            let resolved = match (bound.class, &bound.arg) {
                (ParamClass::DependencyOnly, _) => continue,
                (ParamClass::PassThrough, Arg::Plain(value)) => {
                    Resolved::Wrapped(wrap(value.clone()))
                }
                (ParamClass::PassThrough, Arg::Wrapped(node)) => Resolved::Wrapped(node.clone()),
                (ParamClass::PassThrough, Arg::Group(nodes)) => Resolved::Group(nodes.clone()),
                (ParamClass::Implicit, Arg::Plain(value)) => Resolved::Value(value.clone()),
                (ParamClass::Implicit, Arg::Wrapped(node)) => {
                    Resolved::Value(self.unwrap_arg(&bound.name, node)?)
                }
                (ParamClass::Implicit, Arg::Group(nodes)) => {
                    let values = nodes
                        .iter()
                        .map(|node| self.unwrap_arg(&bound.name, node))
                        .collect::<Result<_, _>>()?;
                    Resolved::Values(values)
                }
            };
            args.insert(bound.name.clone(), resolved);
        }

        Ok(Call {
            function: self.function.clone(),
            args,
        })
    }

    fn unwrap_arg(&self, name: &str, node: &Wrapped) -> Result<Value, Failure> {
        node.inner().map_err(|source| {
            Failure::new(ReactiveError::Argument {
                arg: name.to_string(),
                function: self.function.to_string(),
                source,
            })
        })
    }
}

/// An argument as the user function sees it.
#[derive(Debug, Clone)]
pub enum Resolved {
    Value(Value),
    Values(SmallVec<[Value; 4]>),
    Wrapped(Wrapped),
    Group(Vec<Wrapped>),
}

/// The arguments of one invocation, by parameter name.
#[derive(Clone)]
pub struct Call {
    function: Rc<str>,
    args: IndexMap<Rc<str>, Resolved>,
}

impl Call {
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn resolved(&self, name: &str) -> Option<&Resolved> {
        self.args.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(|name| &**name)
    }

    fn missing(&self, name: &str) -> Failure {
        Failure::new(ReactiveError::MissingArgument {
            function: self.function.to_string(),
            arg: name.to_string(),
        })
    }

    /// The unwrapped value of an implicit parameter.
    pub fn value(&self, name: &str) -> Result<&Value, Failure> {
        match self.resolved(name) {
            Some(Resolved::Value(value)) => Ok(value),
            _ => Err(self.missing(name)),
        }
    }

    pub fn get<T: Clone + 'static>(&self, name: &str) -> Result<T, Failure> {
        self.value(name)?.get::<T>()
    }

    /// The unwrapped values of an implicit group parameter.
    pub fn values(&self, name: &str) -> Result<&[Value], Failure> {
        match self.resolved(name) {
            Some(Resolved::Values(values)) => Ok(values.as_slice()),
            _ => Err(self.missing(name)),
        }
    }

    /// A pass-through parameter, still wrapped.
    pub fn wrapped(&self, name: &str) -> Result<&Wrapped, Failure> {
        match self.resolved(name) {
            Some(Resolved::Wrapped(node)) => Ok(node),
            _ => Err(self.missing(name)),
        }
    }

    /// A pass-through group parameter.
    pub fn group(&self, name: &str) -> Result<&[Wrapped], Failure> {
        match self.resolved(name) {
            Some(Resolved::Group(nodes)) => Ok(nodes.as_slice()),
            _ => Err(self.missing(name)),
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("function", &self.function)
            .field("args", &self.args)
            .finish()
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{constant, Runtime};

    fn bind_err(signature: &Signature, args: Args) -> String {
        match bind("f", signature, args) {
            Err(ReactiveError::Binding { reason, .. }) => reason,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binding should have failed"),
        }
    }

    #[test]
    fn positional_and_keyword_arguments() {
        let signature = Signature::of(["a", "b", "c"]);
        let binding = bind("f", &signature, Args::new().value(1).kwvalue("c", 3).value(2)).unwrap();
        let call = binding.rewrap().unwrap();

        assert_eq!(call.get::<i32>("a").unwrap(), 1);
        assert_eq!(call.get::<i32>("b").unwrap(), 2);
        assert_eq!(call.get::<i32>("c").unwrap(), 3);
        assert_eq!(call.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn defaults_fill_missing_arguments() {
        let signature = Signature::of(["x"]).param_or("scale", Arg::plain(10));
        let call = bind("f", &signature, Args::new().value(2)).unwrap().rewrap().unwrap();
        assert_eq!(call.get::<i32>("scale").unwrap(), 10);
    }

    #[test]
    fn binding_errors() {
        let signature = Signature::of(["a", "b"]);
        assert!(bind_err(&signature, Args::new().value(1)).contains("missing argument 'b'"));
        assert!(bind_err(&signature, args![].value(1).value(2).value(3)).contains("takes 2"));
        assert!(bind_err(&signature, Args::new().value(1).kwvalue("a", 2)).contains("multiple"));
        assert!(bind_err(&signature, Args::new().value(1).kwvalue("zzz", 2)).contains("'zzz'"));
    }

    #[test]
    fn pass_through_stays_wrapped() {
        let runtime = Runtime::new();
        let style = runtime.cell("red");
        let signature = Signature::of(["data", "style"]).pass_through("style");
        let binding = bind("plot", &signature, Args::new().value(1).arg(&style)).unwrap();
        let call = binding.rewrap().unwrap();

        assert!(call.wrapped("style").unwrap().ptr_eq(&style.as_wrapped()));
        assert!(call.value("style").is_err());
        assert_eq!(binding.observed().count(), 0);
        assert!(!binding.is_reactive());
    }

    #[test]
    fn plain_pass_through_becomes_constant() {
        let signature = Signature::new().pass_through("style");
        let call = bind("plot", &signature, Args::new().value("blue"))
            .unwrap()
            .rewrap()
            .unwrap();
        let style = call.wrapped("style").unwrap();
        assert!(style.is_constant());
        assert_eq!(style.get::<&str>().unwrap(), "blue");
    }

    #[test]
    fn dependency_only_is_observed_but_not_passed() {
        let runtime = Runtime::new();
        let tick = runtime.cell(0u64);
        let other = runtime.cell(0u64);
        let signature = Signature::of(["x"]).dependency_only("refresh");

        let binding = bind(
            "f",
            &signature,
            Args::new()
                .value(1)
                .kwarg("refresh", vec![tick.as_wrapped(), other.as_wrapped()]),
        )
        .unwrap();
        assert_eq!(binding.observed().count(), 2);

        let call = binding.rewrap().unwrap();
        assert!(call.resolved("refresh").is_none());

        // Left out entirely, it defaults to no dependencies.
        let plain = bind("f", &signature, Args::new().value(1)).unwrap();
        assert!(!plain.is_reactive());
    }

    #[test]
    fn groups_unwrap_into_lists() {
        let runtime = Runtime::new();
        let a = runtime.cell(1i32);
        let b = runtime.cell(2i32);
        let signature = Signature::of(["items"]);
        let call = bind("sum", &signature, args![vec![a.as_wrapped(), b.as_wrapped()]])
            .unwrap()
            .rewrap()
            .unwrap();

        let total: i32 = call
            .values("items")
            .unwrap()
            .iter()
            .map(|value| value.get::<i32>().unwrap())
            .sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn failed_argument_names_itself() {
        let runtime = Runtime::new();
        let a = runtime.cell(1i32);
        let b = runtime.cell_uninit();
        let binding = bind("sum", &Signature::of(["a", "b"]), args![&a, &b]).unwrap();

        let failure = binding.rewrap().unwrap_err();
        match failure.error() {
            ReactiveError::Argument { arg, function, source } => {
                assert_eq!(arg, "b");
                assert_eq!(function, "sum");
                assert!(matches!(source.error(), ReactiveError::NotInitialized));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extra_dependencies_are_observed() {
        let runtime = Runtime::new();
        let tick = runtime.cell(());
        let binding = bind("f", &Signature::of(["x"]), Args::new().value(1))
            .unwrap()
            .with_extra(&[tick.as_wrapped(), constant(0)]);
        assert!(binding.is_reactive());
        assert_eq!(binding.observed().count(), 2);
    }
}
