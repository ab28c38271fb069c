//! State Containers
//!
//! A container holds a current value and announces changes to it. The
//! bindings consume containers only through [`StateContainer`]:
//!
//! - synchronous read of the current value
//! - change callbacks, returning a [`Subscription`] that unregisters
//! - a multi-subscriber [`ChangeStream`] without replay
//! - disposal
//! - an error-handler slot
//! - the optional [`LocatorAware`] capability
//!
//! Application containers embed a [`StateNotifier`] and implement
//! [`StateContainer::notifier`]; every other method has a default that
//! delegates to it.

mod notifier;
mod stream;

use std::fmt;
use std::rc::Rc;

use crate::error::ContainerError;
use crate::scope::LocatorAware;

pub use notifier::StateNotifier;
pub use stream::ChangeStream;

/// Receives errors raised inside a container.
pub type ErrorHandler = Rc<dyn Fn(ContainerError)>;

/// Handle to a registered change callback.
///
/// Dropping the handle unregisters the callback. The unregister action runs
/// at most once.
#[must_use = "dropping a Subscription unregisters it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// A subscription that runs `cancel` when released.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Whether releasing this handle still has an effect.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Unregister now.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// An observable state container.
pub trait StateContainer: 'static {
    /// The value the container holds.
    type Value: Clone + PartialEq + 'static;

    /// The notifier backing this container.
    fn notifier(&self) -> &StateNotifier<Self::Value>;

    /// The current value. No side effects.
    fn current(&self) -> Self::Value {
        self.notifier().state()
    }

    /// Register `callback` to run synchronously on every change.
    fn on_change(&self, callback: Box<dyn Fn(&Self::Value)>) -> Subscription {
        self.notifier().add_listener_boxed(callback)
    }

    /// A stream of future values.
    fn changes(&self) -> ChangeStream<Self::Value> {
        self.notifier().stream()
    }

    /// Release the container. Call at most once.
    fn dispose(&self) {
        self.notifier().dispose()
    }

    fn has_error_handler(&self) -> bool {
        self.notifier().has_error_handler()
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        self.notifier().set_error_handler(handler)
    }

    fn has_listeners(&self) -> bool {
        self.notifier().listener_count() > 0
    }

    /// The locator capability, for containers that resolve their own
    /// dependencies.
    fn locator(&self) -> Option<&dyn LocatorAware> {
        None
    }
}
