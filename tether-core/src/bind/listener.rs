//! Change Listener
//!
//! Runs a side-effecting callback for each change of a container's value,
//! without ever rebuilding its child.
//!
//! # How It Works
//!
//! 1. On mount, the current value is recorded as the previous value and a
//!    change callback is registered.
//!
//! 2. On each change the optional filter sees `(previous, current)`. The
//!    previous value is advanced whether or not the filter passes.
//!
//! 3. When the bound container changes, by property update or because the
//!    scope now publishes a different one, the old registration is released
//!    and the previous value is reseeded from the new container. Both paths
//!    compare container identity first, so a change reported through both
//!    hooks is handled once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::container::{StateContainer, Subscription};
use crate::host::{BuildContext, Component, Lifecycle, Phase, Transition};

/// Callback run for each accepted change.
pub type ListenerFn<V> = Rc<dyn Fn(&BuildContext, &V)>;

/// Decides from `(previous, current)` whether the listener runs.
pub type Filter<V> = Rc<dyn Fn(&V, &V) -> bool>;

struct Active<C: StateContainer> {
    container: Rc<C>,
    previous: Rc<RefCell<C::Value>>,
    subscription: Subscription,
}

/// Invokes a callback on container changes.
pub struct ChangeListener<C: StateContainer, Ch> {
    container: Rc<C>,
    listener: ListenerFn<C::Value>,
    filter: Option<Filter<C::Value>>,
    child: Ch,
    follow_scope: bool,
    ctx: Option<Rc<RefCell<BuildContext>>>,
    active: Option<Active<C>>,
    invocations: Rc<Cell<usize>>,
    lifecycle: Lifecycle,
}

impl<C, Ch> ChangeListener<C, Ch>
where
    C: StateContainer,
{
    pub fn new<F>(container: Rc<C>, listener: F, child: Ch) -> Self
    where
        F: Fn(&BuildContext, &C::Value) + 'static,
    {
        Self {
            container,
            listener: Rc::new(listener),
            filter: None,
            child,
            follow_scope: false,
            ctx: None,
            active: None,
            invocations: Rc::new(Cell::new(0)),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Only run the listener when `filter(previous, current)` holds.
    pub fn with_filter<P>(mut self, filter: P) -> Self
    where
        P: Fn(&C::Value, &C::Value) -> bool + 'static,
    {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Re-resolve the container from the scope whenever it is mounted or its
    /// dependencies change, falling back to the container given at
    /// construction when none is published.
    ///
    /// The lookup is a watch, so republishing the container schedules this
    /// element and the host's dependency update moves the subscription.
    pub fn following_scope(mut self) -> Self {
        self.follow_scope = true;
        self
    }

    pub fn container(&self) -> &Rc<C> {
        &self.container
    }

    /// The child, which this component never rebuilds.
    pub fn child(&self) -> &Ch {
        &self.child
    }

    /// The previous value as currently tracked, while mounted.
    pub fn previous(&self) -> Option<C::Value> {
        self.active
            .as_ref()
            .map(|active| active.previous.borrow().clone())
    }

    /// Number of times the listener has run.
    pub fn invocation_count(&self) -> usize {
        self.invocations.get()
    }

    /// Property update: bind to `container`.
    pub fn set_container(&mut self, container: Rc<C>) {
        self.container = container;
        self.resync();
    }

    fn resync(&mut self) {
        let Some(ctx) = self.ctx.clone() else {
            return;
        };
        if let Some(active) = &self.active {
            if Rc::ptr_eq(&active.container, &self.container) {
                return;
            }
        }
        let validation = ctx.borrow().validation();
        if !self.lifecycle.advance(Transition::BeginUpdate, validation) {
            return;
        }

        if let Some(previous) = self.active.take() {
            previous.subscription.cancel();
        }
        self.active = Some(self.subscribe(ctx));
        tracing::debug!("change listener resubscribed");

        self.lifecycle.advance(Transition::EndUpdate, validation);
    }

    fn subscribe(&self, ctx: Rc<RefCell<BuildContext>>) -> Active<C> {
        let container = Rc::clone(&self.container);
        let previous = Rc::new(RefCell::new(container.current()));

        let seen = Rc::clone(&previous);
        let listener = Rc::clone(&self.listener);
        let filter = self.filter.clone();
        let invocations = Rc::clone(&self.invocations);
        let subscription = container.on_change(Box::new(move |next| {
            let before = seen.replace(next.clone());
            let accepted = filter.as_ref().map_or(true, |filter| filter(&before, next));
            let ctx = ctx.borrow().clone();
            if ctx.config().trace_notifications {
                tracing::trace!(element = ?ctx.element(), accepted, "change listener notified");
            }
            if accepted {
                invocations.set(invocations.get() + 1);
                listener(&ctx, next);
            }
        }));

        Active {
            container,
            previous,
            subscription,
        }
    }

    fn adopt_from_scope(&mut self, ctx: &BuildContext) {
        if !self.follow_scope {
            return;
        }
        if let Ok(container) = ctx.watch::<Rc<C>>() {
            self.container = container;
        }
    }
}

impl<C, Ch> Component for ChangeListener<C, Ch>
where
    C: StateContainer,
{
    fn mount(&mut self, ctx: &BuildContext) {
        if !self.lifecycle.advance(Transition::Mount, ctx.validation()) {
            return;
        }
        self.adopt_from_scope(ctx);
        let cell = Rc::new(RefCell::new(ctx.clone()));
        self.ctx = Some(Rc::clone(&cell));
        self.active = Some(self.subscribe(cell));
        tracing::debug!(element = ?ctx.element(), "change listener mounted");
    }

    fn dependencies_changed(&mut self, ctx: &BuildContext) {
        let Some(cell) = &self.ctx else {
            return;
        };
        *cell.borrow_mut() = ctx.clone();
        self.adopt_from_scope(ctx);
        self.resync();
    }

    fn unmount(&mut self) {
        let Some(ctx) = self.ctx.clone() else {
            return;
        };
        let validation = ctx.borrow().validation();
        if !self.lifecycle.advance(Transition::Unmount, validation) {
            return;
        }
        if let Some(active) = self.active.take() {
            active.subscription.cancel();
        }
        self.ctx = None;
        let ctx = ctx.borrow();
        ctx.forget_dependencies();
        tracing::debug!(element = ?ctx.element(), "change listener unmounted");
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }
}

impl<C, Ch> fmt::Debug for ChangeListener<C, Ch>
where
    C: StateContainer,
    C::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeListener")
            .field("phase", &self.lifecycle.phase())
            .field("previous", &self.previous())
            .field("filtered", &self.filter.is_some())
            .field("invocations", &self.invocations.get())
            .finish()
    }
}
