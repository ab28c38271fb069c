//! Error Types
//!
//! Three kinds of failure cross the binding layer:
//!
//! - [`DependencyNotFound`]: a lookup found no publication for the requested
//!   type. Recoverable; callers probe for optional dependencies with it.
//! - [`ContainerError`]: a fault raised inside a container's own logic. It is
//!   reported to the host, never returned to whoever triggered the mutation.
//! - [`UsageError`]: a programming error. These are enforced through
//!   [`ValidationMode`](crate::config::ValidationMode) and are silent when
//!   validation is off.

use std::any::TypeId;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

use crate::host::{Phase, Transition};

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A lookup for `T` found no publication above the requesting position.
///
/// The requested type is part of the error's type, so a miss for one
/// dependency can never be mistaken for a miss of another.
pub struct DependencyNotFound<T: ?Sized> {
    _requested: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + 'static> DependencyNotFound<T> {
    pub(crate) fn new() -> Self {
        Self {
            _requested: PhantomData,
        }
    }

    /// Name of the type that could not be resolved.
    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    /// Identity of the type that could not be resolved.
    pub fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

impl<T: ?Sized + 'static> Clone for DependencyNotFound<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> PartialEq for DependencyNotFound<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T: ?Sized + 'static> fmt::Debug for DependencyNotFound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DependencyNotFound")
            .field(&self.type_name())
            .finish()
    }
}

impl<T: ?Sized + 'static> fmt::Display for DependencyNotFound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no provider of `{}` found above this position",
            self.type_name()
        )
    }
}

impl<T: ?Sized + 'static> std::error::Error for DependencyNotFound<T> {}

/// An uncaught error raised from within a container.
#[derive(Debug, Error)]
#[error("uncaught error in `{container}`: {source}")]
pub struct ContainerError {
    container: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
    stack: Option<String>,
}

impl ContainerError {
    /// Wrap `source` as raised by a container of type `C`.
    ///
    /// A stack trace is captured when the environment enables backtraces.
    pub fn new<C: ?Sized>(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        let backtrace = Backtrace::capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            container: std::any::type_name::<C>(),
            source: source.into(),
            stack,
        }
    }

    /// Type name of the container that raised the error.
    pub fn container(&self) -> &'static str {
        self.container
    }

    /// The stack trace captured when the error was raised, if any.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

/// Misuse of the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error(
        "`{container}` already has an error handler; a created container \
         must not be shared between two providers"
    )]
    ContainerReused { container: &'static str },

    #[error("`{container}` already has listeners before its provider took ownership")]
    ContainerAlreadyObserved { container: &'static str },

    #[error("lookup of `{requested}` called after its call window closed")]
    LocatorClosed { requested: &'static str },

    #[error(
        "lookup of `{requested}` through the bound locator during a dependency \
         update; use the locator passed to `update_dependencies` instead"
    )]
    ReadDuringUpdate { requested: &'static str },

    #[error("lookup of `{requested}` before a locator was bound")]
    LocatorUnbound { requested: &'static str },

    #[error("`{container}` used after dispose")]
    UseAfterDispose { container: &'static str },

    #[error("cannot apply {transition:?} in phase {from:?}")]
    InvalidTransition { from: Phase, transition: Transition },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no provider of `{type_name}` found above this position")]
    DependencyNotFound { type_name: &'static str },

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("invalid binding configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl<T: ?Sized + 'static> From<DependencyNotFound<T>> for Error {
    fn from(err: DependencyNotFound<T>) -> Self {
        Error::DependencyNotFound {
            type_name: err.type_name(),
        }
    }
}
