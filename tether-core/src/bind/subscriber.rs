//! Value Subscriber
//!
//! Rebuilds a rendered output from a container's value.
//!
//! # How It Works
//!
//! 1. On mount, the current value is read synchronously and a change
//!    callback is registered. The output starts dirty.
//!
//! 2. Each change stores the new value, marks the output dirty and asks the
//!    host to rebuild this element.
//!
//! 3. `render` recomputes only when dirty, so several changes between two
//!    host passes cost one recomputation with the latest value.
//!
//! 4. Swapping the container cancels the old registration, registers on the
//!    new container and re-reads its value inside a single `&mut self` call,
//!    so no render can observe a mismatched container and value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::container::{StateContainer, Subscription};
use crate::host::{BuildContext, Component, Lifecycle, Phase, Transition};

/// Render function of a [`ValueSubscriber`].
pub type Builder<V, Ch, Out> = Rc<dyn Fn(&BuildContext, &V, Option<&Ch>) -> Out>;

/// Cache state of the rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// The cached output reflects the latest value.
    Clean,

    /// The value, container or builder changed since the last render.
    Dirty,
}

struct Binding<V> {
    ctx: BuildContext,
    value: Rc<RefCell<V>>,
    subscription: Subscription,
}

/// Renders from a container's value and re-renders on every change.
pub struct ValueSubscriber<C: StateContainer, Out, Ch = ()> {
    container: Rc<C>,
    builder: Builder<C::Value, Ch, Out>,
    child: Option<Ch>,
    binding: Option<Binding<C::Value>>,
    output: Option<Out>,
    dirty: Rc<Cell<bool>>,
    renders: usize,
    lifecycle: Lifecycle,
}

impl<C, Out, Ch> ValueSubscriber<C, Out, Ch>
where
    C: StateContainer,
    Out: 'static,
    Ch: 'static,
{
    pub fn new<F>(container: Rc<C>, builder: F) -> Self
    where
        F: Fn(&BuildContext, &C::Value, Option<&Ch>) -> Out + 'static,
    {
        Self {
            container,
            builder: Rc::new(builder),
            child: None,
            binding: None,
            output: None,
            dirty: Rc::new(Cell::new(true)),
            renders: 0,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Attach a pre-built child that is handed to the builder unchanged.
    pub fn with_child(mut self, child: Ch) -> Self {
        self.child = Some(child);
        self
    }

    pub fn container(&self) -> &Rc<C> {
        &self.container
    }

    /// The value the next render will use, while mounted.
    pub fn value(&self) -> Option<C::Value> {
        self.binding
            .as_ref()
            .map(|binding| binding.value.borrow().clone())
    }

    pub fn render_state(&self) -> RenderState {
        if self.dirty.get() || self.output.is_none() {
            RenderState::Dirty
        } else {
            RenderState::Clean
        }
    }

    /// Number of times the builder has run.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// Produce the output, running the builder only if something changed.
    ///
    /// Returns `None` while not mounted.
    pub fn render(&mut self) -> Option<&Out> {
        let binding = self.binding.as_ref()?;
        if self.render_state() == RenderState::Dirty {
            let value = binding.value.borrow().clone();
            self.dirty.set(false);
            let output = (self.builder)(&binding.ctx, &value, self.child.as_ref());
            self.output = Some(output);
            self.renders += 1;
        }
        self.output.as_ref()
    }

    /// Replace the child. The cached output is kept.
    pub fn set_child(&mut self, child: Ch) {
        self.child = Some(child);
    }

    /// Replace the builder. The next render recomputes.
    pub fn set_builder<F>(&mut self, builder: F)
    where
        F: Fn(&BuildContext, &C::Value, Option<&Ch>) -> Out + 'static,
    {
        self.builder = Rc::new(builder);
        self.dirty.set(true);
    }

    /// Bind to a different container.
    ///
    /// Passing the container already bound is a no-op.
    pub fn set_container(&mut self, container: Rc<C>) {
        if Rc::ptr_eq(&self.container, &container) {
            return;
        }
        let Some(previous) = self.binding.take() else {
            self.container = container;
            self.dirty.set(true);
            return;
        };
        let validation = previous.ctx.validation();
        if !self.lifecycle.advance(Transition::BeginUpdate, validation) {
            self.binding = Some(previous);
            return;
        }

        let Binding {
            ctx, subscription, ..
        } = previous;
        subscription.cancel();
        self.container = container;
        self.binding = Some(self.bind(ctx));
        self.dirty.set(true);
        tracing::debug!(
            element = ?self.binding.as_ref().map(|b| b.ctx.element()),
            "value subscriber swapped container"
        );

        self.lifecycle.advance(Transition::EndUpdate, validation);
    }

    fn bind(&self, ctx: BuildContext) -> Binding<C::Value> {
        let value = Rc::new(RefCell::new(self.container.current()));

        let cell = Rc::clone(&value);
        let dirty = Rc::clone(&self.dirty);
        let host = Rc::clone(ctx.host());
        let element = ctx.element();
        let trace = ctx.config().trace_notifications;
        let subscription = self.container.on_change(Box::new(move |next| {
            *cell.borrow_mut() = next.clone();
            dirty.set(true);
            if trace {
                tracing::trace!(?element, "value subscriber notified");
            }
            host.schedule_rebuild(element);
        }));

        Binding {
            ctx,
            value,
            subscription,
        }
    }
}

impl<C, Out, Ch> Component for ValueSubscriber<C, Out, Ch>
where
    C: StateContainer,
    Out: 'static,
    Ch: 'static,
{
    fn mount(&mut self, ctx: &BuildContext) {
        if !self.lifecycle.advance(Transition::Mount, ctx.validation()) {
            return;
        }
        self.binding = Some(self.bind(ctx.clone()));
        self.dirty.set(true);
        tracing::debug!(element = ?ctx.element(), "value subscriber mounted");
    }

    fn dependencies_changed(&mut self, ctx: &BuildContext) {
        if !self.lifecycle.advance(Transition::BeginUpdate, ctx.validation()) {
            return;
        }
        if let Some(binding) = self.binding.as_mut() {
            binding.ctx = ctx.clone();
        }
        self.dirty.set(true);
        self.lifecycle.advance(Transition::EndUpdate, ctx.validation());
    }

    fn unmount(&mut self) {
        let Some(binding) = self.binding.as_ref() else {
            return;
        };
        if !self.lifecycle.advance(Transition::Unmount, binding.ctx.validation()) {
            return;
        }
        if let Some(binding) = self.binding.take() {
            binding.ctx.forget_dependencies();
            binding.subscription.cancel();
            tracing::debug!(element = ?binding.ctx.element(), "value subscriber unmounted");
        }
        self.output = None;
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }
}

impl<C, Out, Ch> fmt::Debug for ValueSubscriber<C, Out, Ch>
where
    C: StateContainer,
    C::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSubscriber")
            .field("phase", &self.lifecycle.phase())
            .field("value", &self.binding.as_ref().map(|b| b.value.borrow().clone()))
            .field("dirty", &self.dirty.get())
            .field("renders", &self.renders)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindingConfig, ValidationMode};
    use crate::container::StateNotifier;
    use crate::host::RebuildQueue;

    fn root() -> (Rc<RebuildQueue>, BuildContext) {
        let queue = Rc::new(RebuildQueue::new());
        let ctx = BuildContext::root(queue.clone(), BindingConfig::default());
        (queue, ctx)
    }

    #[test]
    fn renders_initial_value_on_mount() {
        let (_queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(3));
        let mut view: ValueSubscriber<_, String> =
            ValueSubscriber::new(notifier, |_, v: &i32, _| format!("count {v}"));

        assert!(view.render().is_none());
        view.mount(&ctx);
        assert_eq!(view.render().map(String::as_str), Some("count 3"));
        assert_eq!(view.render_count(), 1);
    }

    #[test]
    fn changes_coalesce_into_one_render() {
        let (queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(0));
        let mut view: ValueSubscriber<_, i32> =
            ValueSubscriber::new(notifier.clone(), |_, v: &i32, _| *v);
        view.mount(&ctx);
        view.render();

        notifier.set_state(1);
        notifier.set_state(2);
        assert!(queue.is_scheduled(ctx.element()));
        assert_eq!(view.render_state(), RenderState::Dirty);

        assert_eq!(view.render(), Some(&2));
        assert_eq!(view.render(), Some(&2));
        assert_eq!(view.render_count(), 2);
    }

    #[test]
    fn child_change_keeps_cached_output() {
        let (_queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(1));
        let mut view = ValueSubscriber::new(notifier, |_, v: &i32, child: Option<&&str>| {
            format!("{}:{v}", child.copied().unwrap_or("-"))
        })
        .with_child("a");
        view.mount(&ctx);
        assert_eq!(view.render().map(String::as_str), Some("a:1"));

        view.set_child("b");
        assert_eq!(view.render_state(), RenderState::Clean);
        view.render();
        assert_eq!(view.render_count(), 1);
    }

    #[test]
    fn builder_change_recomputes() {
        let (_queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(2));
        let mut view: ValueSubscriber<_, i32> = ValueSubscriber::new(notifier, |_, v: &i32, _| *v);
        view.mount(&ctx);
        view.render();

        view.set_builder(|_, v: &i32, _| v * 10);
        assert_eq!(view.render(), Some(&20));
    }

    #[test]
    fn unmount_releases_the_registration() {
        let (_queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(0));
        let mut view: ValueSubscriber<_, i32> =
            ValueSubscriber::new(notifier.clone(), |_, v: &i32, _| *v);
        view.mount(&ctx);
        assert_eq!(notifier.listener_count(), 1);

        view.unmount();
        assert_eq!(notifier.listener_count(), 0);
        assert_eq!(view.phase(), Phase::Defunct);
        assert!(view.render().is_none());
    }

    #[test]
    fn dependency_change_recomputes_with_the_new_context() {
        let (_queue, ctx) = root();
        let notifier = Rc::new(StateNotifier::new(1));
        let mut view: ValueSubscriber<_, u64> =
            ValueSubscriber::new(notifier, |ctx, _: &i32, _| ctx.element().raw());
        view.mount(&ctx);
        view.render();

        let moved = ctx.reparented(ctx.scope().clone());
        view.dependencies_changed(&moved);
        assert_eq!(view.phase(), Phase::Mounted);
        assert_eq!(view.render_state(), RenderState::Dirty);
        assert_eq!(view.render(), Some(&moved.element().raw()));
        assert_eq!(view.render_count(), 2);
    }

    #[test]
    #[should_panic(expected = "cannot apply BeginUpdate in phase Defunct")]
    fn dependency_change_after_unmount_fails_loudly() {
        let queue = Rc::new(RebuildQueue::new());
        let ctx = BuildContext::root(
            queue,
            BindingConfig::default().with_validation(ValidationMode::Strict),
        );
        let mut view: ValueSubscriber<_, i32> =
            ValueSubscriber::new(Rc::new(StateNotifier::new(0)), |_, v: &i32, _| *v);
        view.mount(&ctx);
        view.unmount();
        view.dependencies_changed(&ctx);
    }

    #[test]
    fn dependency_change_before_mount_is_ignored_without_validation() {
        let queue = Rc::new(RebuildQueue::new());
        let ctx = BuildContext::root(
            queue,
            BindingConfig::default().with_validation(ValidationMode::Off),
        );
        let mut view: ValueSubscriber<_, i32> =
            ValueSubscriber::new(Rc::new(StateNotifier::new(0)), |_, v: &i32, _| *v);
        view.dependencies_changed(&ctx);
        assert_eq!(view.phase(), Phase::Initial);
    }

    #[test]
    fn swap_before_mount_binds_the_new_container() {
        let (_queue, ctx) = root();
        let first = Rc::new(StateNotifier::new(1));
        let second = Rc::new(StateNotifier::new(2));
        let mut view: ValueSubscriber<_, i32> =
            ValueSubscriber::new(first.clone(), |_, v: &i32, _| *v);

        view.set_container(second.clone());
        view.mount(&ctx);
        assert_eq!(view.render(), Some(&2));
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
    }
}
