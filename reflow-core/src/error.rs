//! Error Types
//!
//! Two kinds of errors flow through the engine:
//!
//! - [`Failure`]: a *carried* failure. It is stored as a node's current value
//!   instead of being raised, and every dependent decides on its own (by
//!   unwrapping) whether to fail too.
//! - [`ReactiveError`] returned directly from an API call: a programmer error
//!   (binding mismatch, cycle, writing a read-only node, reopening a scope).
//!
//! A `Failure` is a cheap, clonable handle around a `ReactiveError`, so both
//! share one taxonomy.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Every error the engine knows about.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A cell was read before any value was set.
    #[error("not initialized")]
    NotInitialized,

    /// An implicit argument was itself a failed wrapped value.
    #[error("propagating failure from argument '{arg}' of {function}")]
    Argument {
        arg: String,
        function: String,
        #[source]
        source: Failure,
    },

    /// A deliberately expected failure. Carried like any other, never logged.
    #[error("{0}")]
    Silent(String),

    /// A failure described by a message.
    #[error("{0}")]
    Message(String),

    /// A failure raised by user code with its own error type.
    #[error(transparent)]
    Custom(Box<dyn StdError + Send + Sync + 'static>),

    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Indexing a collection node with a key or position it does not have.
    #[error("{container} has no item {key}")]
    MissingItem { container: &'static str, key: String },

    #[error("{function} has no argument '{arg}' of the requested kind")]
    MissingArgument { function: String, arg: String },

    /// A scope was opened while the previous one was still open.
    #[error("scope of {function} is still open")]
    ScopeStillOpen { function: String },

    #[error("{node} is read-only")]
    ReadOnly { node: String },

    #[error("cannot bind arguments of {function}: {reason}")]
    Binding { function: String, reason: String },

    #[error("observing {observed} from {observer} would create a cycle")]
    Cycle { observed: String, observer: String },

    #[error("{node} belongs to another runtime")]
    ForeignNode { node: String },

    #[error("background task of {node} failed: {reason}")]
    Task { node: String, reason: String },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Whether this is a programmer error rather than a value-level failure.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::ScopeStillOpen { .. }
                | Self::ReadOnly { .. }
                | Self::Binding { .. }
                | Self::Cycle { .. }
                | Self::ForeignNode { .. }
        )
    }
}

/// A carried failure: the failed state of a node.
///
/// Cloning is cheap. The cause chain is reachable through
/// [`std::error::Error::source`], so a propagated argument failure still
/// points at the root cause.
#[derive(Clone)]
pub struct Failure(Arc<ReactiveError>);

impl Failure {
    pub fn new(error: ReactiveError) -> Self {
        Self(Arc::new(error))
    }

    /// A failure with a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(ReactiveError::Message(message.into()))
    }

    /// A failure that is carried downstream without being logged.
    pub fn silent(message: impl Into<String>) -> Self {
        Self::new(ReactiveError::Silent(message.into()))
    }

    /// Wrap an arbitrary user error.
    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(ReactiveError::Custom(Box::new(error)))
    }

    pub(crate) fn not_initialized() -> Self {
        Self::new(ReactiveError::NotInitialized)
    }

    /// The error this failure carries.
    pub fn error(&self) -> &ReactiveError {
        &self.0
    }

    /// Follow propagated argument failures down to the original one.
    pub fn root_cause(&self) -> &ReactiveError {
        let mut current = self;
        while let ReactiveError::Argument { source, .. } = current.error() {
            current = source;
        }
        current.error()
    }

    pub fn is_silent(&self) -> bool {
        matches!(self.root_cause(), ReactiveError::Silent(_))
    }

    /// Propagated argument failures were already reported where they started.
    pub(crate) fn should_log(&self) -> bool {
        !matches!(
            self.error(),
            ReactiveError::Silent(_) | ReactiveError::Argument { .. }
        )
    }

    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ReactiveError> for Failure {
    fn from(error: ReactiveError) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argument(arg: &str, function: &str, source: Failure) -> Failure {
        Failure::new(ReactiveError::Argument {
            arg: arg.to_string(),
            function: function.to_string(),
            source,
        })
    }

    #[test]
    fn argument_failure_names_argument_and_function() {
        let failure = argument("b", "sum", Failure::not_initialized());
        let text = failure.to_string();
        assert!(text.contains("'b'"));
        assert!(text.contains("sum"));
    }

    #[test]
    fn cause_chain_reaches_root() {
        let root = Failure::msg("boom");
        let failure = argument("y", "outer", argument("x", "inner", root));

        assert!(matches!(failure.root_cause(), ReactiveError::Message(m) if m == "boom"));

        let source = failure.source().expect("argument failure has a source");
        assert!(source.to_string().contains("inner"));
    }

    #[test]
    fn silent_failures_are_not_logged() {
        assert!(!Failure::silent("value is None").should_log());
        assert!(Failure::silent("value is None").is_silent());
        assert!(Failure::msg("boom").should_log());
        assert!(!argument("a", "f", Failure::msg("boom")).should_log());
        assert!(argument("a", "f", Failure::silent("skip")).is_silent());
    }

    #[test]
    fn misuse_classification() {
        let binding = ReactiveError::Binding {
            function: "f".into(),
            reason: "too many arguments".into(),
        };
        assert!(binding.is_misuse());
        assert!(!ReactiveError::NotInitialized.is_misuse());
    }

    #[test]
    fn custom_errors_keep_their_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let failure = Failure::custom(io);
        assert_eq!(failure.to_string(), "missing file");
    }
}
