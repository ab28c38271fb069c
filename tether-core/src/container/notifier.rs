//! State Notifier
//!
//! A `StateNotifier` holds one value and tells its listeners whenever that
//! value changes. It is the container the bindings are built around.
//!
//! # How Notification Works
//!
//! 1. `set_state` compares the new value with the current one. Equal values
//!    are dropped without notifying anyone.
//!
//! 2. On a real change the value and version are updated, then every
//!    listener is called synchronously, in registration order, before
//!    `set_state` returns.
//!
//! 3. The internal borrow is released before listeners run, so listeners may
//!    read the state and may register or cancel subscriptions.
//!
//! # Errors
//!
//! Errors raised by the notifier's own logic go through
//! [`report_error`](StateNotifier::report_error). They reach the installed
//! error handler, or the log when none is installed. They are never returned
//! to the caller that triggered the mutation.
//!
//! # Threading
//!
//! Notifiers live on the UI thread. They are `Rc`-based and neither `Send`
//! nor `Sync`.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::config::ValidationMode;
use crate::error::{ContainerError, UsageError};

use super::stream::{channel, ChangeStream, StreamSink};
use super::{ErrorHandler, StateContainer, Subscription};

/// Counter for generating unique notifier IDs.
static NOTIFIER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique notifier ID.
fn next_notifier_id() -> u64 {
    NOTIFIER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Listener<T> = Rc<dyn Fn(&T)>;

struct NotifierInner<T> {
    state: T,
    version: u64,
    next_listener: u64,
    listeners: SmallVec<[(u64, Listener<T>); 4]>,
    streams: Vec<StreamSink<T>>,
    on_error: Option<ErrorHandler>,
    disposed: bool,
    validation: ValidationMode,
}

/// An observable value of type `T`.
///
/// Cloning a `StateNotifier` creates a new handle to the same state,
/// including its validation mode.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tether_core::container::StateNotifier;
///
/// let count = StateNotifier::new(0);
/// let seen = Rc::new(Cell::new(0));
/// let seen_clone = seen.clone();
///
/// let _subscription = count.add_listener(move |v| seen_clone.set(*v), false);
/// count.set_state(5);
/// assert_eq!(seen.get(), 5);
/// ```
pub struct StateNotifier<T> {
    id: u64,
    inner: Rc<RefCell<NotifierInner<T>>>,
}

impl<T> StateNotifier<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new notifier with the given initial state.
    pub fn new(state: T) -> Self {
        Self {
            id: next_notifier_id(),
            inner: Rc::new(RefCell::new(NotifierInner {
                state,
                version: 0,
                next_listener: 0,
                listeners: SmallVec::new(),
                streams: Vec::new(),
                on_error: None,
                disposed: false,
                validation: ValidationMode::default(),
            })),
        }
    }

    /// Override the validation mode inherited from the build profile.
    pub fn with_validation(self, validation: ValidationMode) -> Self {
        self.set_validation(validation);
        self
    }

    /// Replace the validation mode. A create-mode provider applies its
    /// tree's mode here when it takes ownership.
    pub fn set_validation(&self, validation: ValidationMode) {
        self.inner.borrow_mut().validation = validation;
    }

    pub fn validation(&self) -> ValidationMode {
        self.inner.borrow().validation
    }

    /// Get the notifier's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get a clone of the current state.
    pub fn state(&self) -> T {
        self.inner.borrow().state.clone()
    }

    /// Access the current state by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().state)
    }

    /// Number of value-changing mutations so far.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Replace the state and notify listeners if it changed.
    #[track_caller]
    pub fn set_state(&self, state: T) {
        if !self.ensure_mounted() {
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state == state {
                return;
            }
            inner.state = state;
            inner.version += 1;
        }
        self.notify();
    }

    /// Update the state using a function of the current state.
    #[track_caller]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.borrow().state);
        self.set_state(next);
    }

    /// Update the state with a fallible function.
    ///
    /// On failure the state is left untouched and the error is reported
    /// through [`report_error`](Self::report_error).
    #[track_caller]
    pub fn try_update<F, E>(&self, f: F)
    where
        F: FnOnce(&T) -> Result<T, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let result = f(&self.inner.borrow().state);
        match result {
            Ok(next) => self.set_state(next),
            Err(err) => self.report_error(ContainerError::new::<Self>(err)),
        }
    }

    /// Route an error raised by this notifier's logic to its error handler.
    pub fn report_error(&self, error: ContainerError) {
        let handler = self.inner.borrow().on_error.clone();
        match handler {
            Some(handler) => handler(error),
            None => {
                tracing::warn!(
                    notifier = self.id,
                    error = %error,
                    "container error raised with no handler installed"
                );
            }
        }
    }

    /// Register a listener called with every new state.
    ///
    /// With `fire_immediately`, the listener is also called once with the
    /// current state before this returns.
    #[track_caller]
    pub fn add_listener<F>(&self, listener: F, fire_immediately: bool) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.add_listener_rc(Rc::new(listener), fire_immediately)
    }

    #[track_caller]
    fn add_listener_rc(&self, listener: Listener<T>, fire_immediately: bool) -> Subscription {
        if !self.ensure_mounted() {
            return Subscription::empty();
        }
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.push((id, Rc::clone(&listener)));
            id
        };
        if fire_immediately {
            let state = self.state();
            listener(&state);
        }

        let weak: Weak<RefCell<NotifierInner<T>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|(l, _)| *l != id);
            }
        })
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// A new stream of future states.
    pub fn stream(&self) -> ChangeStream<T> {
        let (sink, stream) = channel();
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            sink.close();
        } else {
            inner.streams.push(sink);
        }
        stream
    }

    /// Whether [`dispose`](Self::dispose) has not been called yet.
    pub fn is_mounted(&self) -> bool {
        !self.inner.borrow().disposed
    }

    pub fn has_error_handler(&self) -> bool {
        self.inner.borrow().on_error.is_some()
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.inner.borrow_mut().on_error = Some(handler);
    }

    /// Release listeners and end every stream.
    #[track_caller]
    pub fn dispose(&self) {
        if !self.ensure_mounted() {
            return;
        }
        let (listeners, streams) = {
            let mut inner = self.inner.borrow_mut();
            inner.disposed = true;
            inner.on_error = None;
            (
                std::mem::take(&mut inner.listeners),
                std::mem::take(&mut inner.streams),
            )
        };
        for sink in &streams {
            sink.close();
        }
        tracing::debug!(
            notifier = self.id,
            listeners = listeners.len(),
            streams = streams.len(),
            "notifier disposed"
        );
    }

    #[track_caller]
    fn ensure_mounted(&self) -> bool {
        let (disposed, validation) = {
            let inner = self.inner.borrow();
            (inner.disposed, inner.validation)
        };
        validation.check(|| {
            disposed.then(|| UsageError::UseAfterDispose {
                container: std::any::type_name::<Self>(),
            })
        });
        !disposed
    }

    /// Notify all listeners and streams of the current state.
    fn notify(&self) {
        let (state, listeners) = {
            let inner = self.inner.borrow();
            let listeners: SmallVec<[Listener<T>; 4]> =
                inner.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
            (inner.state.clone(), listeners)
        };

        for listener in &listeners {
            listener(&state);
        }

        self.inner
            .borrow_mut()
            .streams
            .retain(|sink| sink.push(state.clone()));
    }
}

impl<T> Clone for StateNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for StateNotifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("StateNotifier")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("listener_count", &inner.listeners.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<T> StateContainer for StateNotifier<T>
where
    T: Clone + PartialEq + 'static,
{
    type Value = T;

    fn notifier(&self) -> &StateNotifier<T> {
        self
    }
}

impl<T> StateNotifier<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn add_listener_boxed(&self, listener: Box<dyn Fn(&T)>) -> Subscription {
        self.add_listener_rc(Rc::from(listener), false)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
